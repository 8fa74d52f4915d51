//! Rule data: commands, the rule set that indexes them, and the shared
//! snapshot store the dispatcher reads from.

pub mod command;
pub mod ruleset;
pub mod store;

pub use command::{Command, CommandId};
pub use ruleset::RuleSet;
pub use store::RuleStore;
