#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Chatplays: let a live chat drive a game through keyboard and mouse input.
//!
//! Chat messages are matched against a set of alias rules; every command a
//! message names fires its action sequence through an input injector. The
//! codebase is split into cohesive modules:
//! - `config`: Profile models, key vocabulary, loader, and schema helpers.
//! - `rules`: Commands, the rule set, and the snapshot store shared with the dispatcher.
//! - `matching`: Message normalization and alias resolution.
//! - `executor`: Input injection and ordered, timed action sequences.
//! - `sources`: Chat feeds (Twitch IRC, stdin).
//! - `dispatch`: The dispatcher tying feeds, rules, and sequences together.
//!
//! Use `chatplays::prelude::*` to bring commonly used items into scope quickly.

/// Public module: profiles (models, key names, loader, schema helpers).
pub mod config;
/// Public module: dispatcher and profile hot reload.
pub mod dispatch;
/// Public module: error types.
pub mod error;
/// Public module: input injection and action sequencing.
pub mod executor;
/// Public module: message matching.
pub mod matching;
/// Public module: commands and rule sets.
pub mod rules;
/// Public module: chat feeds (twitch, stdin).
pub mod sources;

#[cfg(test)]
mod test_support;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a level name (trace|debug|info|warn|error), case-insensitively.
pub fn parse_level(name: &str) -> Option<tracing::Level> {
    use tracing::Level;

    match name.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging) with a reasonable default.
/// - `level` wins when given and valid.
/// - Otherwise honors the `RUST_LOG` environment variable as a simple level.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::fmt;

    let level = level
        .and_then(parse_level)
        .or_else(|| std::env::var("RUST_LOG").ok().as_deref().and_then(parse_level))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use chatplays::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    // External crates (namespaced) if callers want direct access
    pub use crate as chatplays;
    pub use enigo;

    // Frequently used items
    pub use crate::config::{Action, Key, MouseButton, Profile};
    pub use crate::dispatch::{Dispatcher, DispatcherSettings};
    pub use crate::executor::{ActionSequencer, DryRunInjector, EnigoInjector, InputInjector};
    pub use crate::rules::{Command, CommandId, RuleSet};
    pub use crate::sources::{ChatMessage, FeedState};
    pub use crate::{config, dispatch, executor, matching, rules, sources};
}
