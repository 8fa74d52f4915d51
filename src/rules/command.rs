use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Action;
use crate::matching::normalize;

/// Opaque command identifier, unique within a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A set of aliases bound to one action sequence.
///
/// Commands are immutable values; edits build a replacement. The action list
/// is shared behind an `Arc` so handing it to a sequencer is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: CommandId,
    aliases: BTreeSet<String>,
    actions: Arc<[Action]>,
    enabled: bool,
}

impl Command {
    /// Build a command. Aliases are normalized; blank ones are dropped.
    pub fn new<I, S>(id: CommandId, aliases: I, actions: Vec<Action>, enabled: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let aliases = aliases
            .into_iter()
            .map(|a| normalize(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        Self {
            id,
            aliases,
            actions: actions.into(),
            enabled,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Normalized aliases, sorted.
    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Shared handle to the action list.
    pub fn shared_actions(&self) -> Arc<[Action]> {
        Arc::clone(&self.actions)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Copy of this command with a different enabled flag.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    /// Copy of this command without `alias`. Losing the last alias disables it.
    pub fn without_alias(&self, alias: &str) -> Self {
        let mut aliases = self.aliases.clone();
        aliases.remove(alias);
        let enabled = self.enabled && !aliases.is_empty();
        Self {
            aliases,
            enabled,
            ..self.clone()
        }
    }
}
