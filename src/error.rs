//! Error types shared across the crate.
//!
//! Nothing here is fatal to the process: every error describes one operation
//! that did not happen, and the caller logs it and carries on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::rules::CommandId;

/// Informational: an alias was already owned by another command and has been
/// reassigned to the newer claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("alias '{alias}' reassigned from command {previous} to command {claimed_by}")]
pub struct DuplicateAliasWarning {
    /// The normalized alias.
    pub alias: String,
    /// Command that owned the alias before.
    pub previous: CommandId,
    /// Command that owns it now.
    pub claimed_by: CommandId,
}

/// Rejected rule set edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    /// No command with this id exists in the current snapshot.
    #[error("unknown command {0}")]
    UnknownCommand(CommandId),

    /// An enabled command must keep at least one non-blank alias.
    #[error("command needs at least one non-blank alias")]
    EmptyAliases,

    /// Every command id is taken.
    #[error("no command ids left")]
    IdsExhausted,
}

/// A profile could not be loaded; the previous rule set is untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document is not a structurally valid profile.
    #[error("malformed profile: {reason}")]
    Malformed { reason: String },

    /// The profile file could not be read.
    #[error("failed to read profile {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl LoadError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// A profile could not be written.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to serialize profile: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write profile {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Low-level failure reported by the input injection capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectError {
    /// The input device could not be opened or has gone away.
    #[error("input device unavailable: {0}")]
    Unavailable(String),

    /// The OS refused the event.
    #[error("event rejected: {0}")]
    Rejected(String),
}

/// An action sequence stopped at `index`; earlier actions were already issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action {index} ({action}) failed: {source}")]
pub struct InjectionError {
    /// Position of the failed action in its sequence.
    pub index: usize,
    /// Kind of the failed action.
    pub action: &'static str,
    pub source: InjectError,
}

/// Chat feed failures. These stay inside the feed task and only surface as
/// a "not listening" connection state.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("channel name must not be empty")]
    InvalidChannel,

    #[error("feed I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no login confirmation from the chat server")]
    LoginTimeout,

    #[error("message intake closed")]
    IntakeClosed,
}

/// The profile watcher could not be set up.
#[derive(Debug, Error)]
#[error("failed to watch {}: {source}", path.display())]
pub struct WatchError {
    pub path: PathBuf,
    pub source: notify::Error,
}

/// A line typed on the operator console is not a known command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operator command '{0}' (expected pause, resume, status or stop)")]
pub struct UnknownOperatorCommand(pub String);
