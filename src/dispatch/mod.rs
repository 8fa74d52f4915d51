/*!
Dispatch layer.

Ties the pieces together: a chat feed delivers messages, the matching
engine resolves them against the live rule set, and every fired command
runs on its own task through the action sequencer.

- `dispatcher.rs` -> `Dispatcher` (state, rule editing, profiles, feed control)
- `reload.rs`     -> `ProfileWatcher` (reload the profile when its file changes)
- `control.rs`    -> operator console and signals (emergency stop)
*/

pub mod control;
pub mod dispatcher;
pub mod reload;

pub use control::OperatorCommand;
pub use dispatcher::{
    DispatchState, DispatchStats, Dispatcher, DispatcherSettings, MessageIntake,
};
pub use reload::ProfileWatcher;
