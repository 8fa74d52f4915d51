#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Executor module for chatplays.

This module wires together:
- `injector`: the input injection capability (`InputInjector`) with Enigo-backed and dry-run
  implementations
- `sequencer`: ordered, timed execution of one action sequence against an injector

Typical usage:
- Pick an injector (`EnigoInjector::spawn()` for real input, `DryRunInjector` to only log).
- Wrap it in an `ActionSequencer` and call `run` with a command's actions.

Example:
```no_run
use std::sync::Arc;
use chatplays::config::{Action, Key};
use chatplays::executor::{ActionSequencer, DryRunInjector};

# async fn demo() {
let sequencer = ActionSequencer::new(Arc::new(DryRunInjector));
let jump = [Action::KeyPress { key: Key::Space, hold_ms: 200 }];
sequencer.run(&jump).await.ok();
# }
```
*/

pub mod injector;
pub mod sequencer;

// Re-exports for convenient access from `chatplays::executor::*`
pub use injector::{DryRunInjector, EnigoInjector, InputEvent, InputInjector};
pub use sequencer::ActionSequencer;
