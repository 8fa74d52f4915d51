use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::config::{self, Action, CommandDef, Profile, PROFILE_VERSION};
use crate::error::{DuplicateAliasWarning, LoadError, RuleSetError, SaveError};
use crate::matching::{AliasMatcher, normalize};

use super::command::{Command, CommandId};

/// All commands plus the lookup structures derived from them.
///
/// `commands` is the source of truth. `owners` maps every alias to the
/// command holding it, `index` is the projection of enabled commands only,
/// and `matcher` is `index` compiled for scanning. Every mutating method
/// rebuilds the derived structures before returning, so a `RuleSet` value is
/// always self-consistent; [`super::RuleStore`] publishes whole values.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    commands: BTreeMap<CommandId, Command>,
    owners: HashMap<String, CommandId>,
    index: HashMap<String, CommandId>,
    matcher: AliasMatcher,
    next_id: u64,
}

impl RuleSet {
    /// An empty rule set.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, id: CommandId) -> Option<&Command> {
        self.commands.get(&id)
    }

    /// Commands in id order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// The enabled command an alias resolves to, if any.
    pub fn lookup(&self, alias: &str) -> Option<&Command> {
        self.index
            .get(&normalize(alias))
            .and_then(|id| self.commands.get(id))
    }

    /// Compiled matcher over enabled aliases.
    pub fn matcher(&self) -> &AliasMatcher {
        &self.matcher
    }

    /// Add an enabled command.
    ///
    /// Aliases already owned by another command are moved to the new one; each
    /// move is reported as a [`DuplicateAliasWarning`].
    pub fn add_command<I, S>(
        &mut self,
        aliases: I,
        actions: Vec<Action>,
    ) -> Result<(CommandId, Vec<DuplicateAliasWarning>), RuleSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = self.allocate_id()?;
        let command = Command::new(id, aliases, actions, true);
        if command.aliases().is_empty() {
            self.next_id = id.get();
            return Err(RuleSetError::EmptyAliases);
        }

        let warnings = self.claim(command);
        self.reindex();
        debug!(target: "chatplays::rules", %id, "command added");
        Ok((id, warnings))
    }

    /// Replace the aliases and actions of an existing command, keeping its id
    /// and enabled flag.
    pub fn update_command<I, S>(
        &mut self,
        id: CommandId,
        aliases: I,
        actions: Vec<Action>,
    ) -> Result<Vec<DuplicateAliasWarning>, RuleSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let existing = self
            .commands
            .get(&id)
            .ok_or(RuleSetError::UnknownCommand(id))?;
        let command = Command::new(id, aliases, actions, existing.is_enabled());
        if command.aliases().is_empty() {
            return Err(RuleSetError::EmptyAliases);
        }

        self.commands.remove(&id);
        let warnings = self.claim(command);
        self.reindex();
        debug!(target: "chatplays::rules", %id, "command updated");
        Ok(warnings)
    }

    /// Remove a command, releasing its aliases.
    pub fn remove_command(&mut self, id: CommandId) -> Result<Command, RuleSetError> {
        let removed = self
            .commands
            .remove(&id)
            .ok_or(RuleSetError::UnknownCommand(id))?;
        self.reindex();
        debug!(target: "chatplays::rules", %id, "command removed");
        Ok(removed)
    }

    /// Enable or disable a command. Disabled commands keep their aliases.
    pub fn set_enabled(&mut self, id: CommandId, enabled: bool) -> Result<(), RuleSetError> {
        let command = self
            .commands
            .get(&id)
            .ok_or(RuleSetError::UnknownCommand(id))?;
        if command.is_enabled() == enabled {
            return Ok(());
        }
        if enabled && command.aliases().is_empty() {
            return Err(RuleSetError::EmptyAliases);
        }

        let replaced = command.with_enabled(enabled);
        self.commands.insert(id, replaced);
        self.reindex();
        debug!(target: "chatplays::rules", %id, enabled, "command toggled");
        Ok(())
    }

    /// Parse a JSON profile into a fresh rule set.
    ///
    /// Nothing is shared with any existing rule set, so a failure here cannot
    /// disturb the one currently in use.
    pub fn load(raw: &str) -> Result<Self, LoadError> {
        let profile = config::parse_profile(raw)?;
        Self::from_profile(&profile)
    }

    /// Build a rule set from an already parsed profile.
    pub fn from_profile(profile: &Profile) -> Result<Self, LoadError> {
        config::validate_profile(profile)?;

        let mut rules = Self::new();
        rules.next_id = profile
            .commands
            .iter()
            .filter_map(|c| c.id)
            .max()
            .map_or(1, |max| max.saturating_add(1));

        for def in &profile.commands {
            let id = match def.id {
                Some(raw) => CommandId::new(raw),
                None => rules
                    .allocate_id()
                    .map_err(|e| LoadError::malformed(e.to_string()))?,
            };
            let command = Command::new(id, &def.aliases, def.actions.clone(), def.enabled);
            rules.claim(command);
        }

        rules.reindex();
        Ok(rules)
    }

    /// Serialize to the JSON profile form.
    pub fn save(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(&self.to_profile())?)
    }

    /// The profile document describing this rule set.
    pub fn to_profile(&self) -> Profile {
        Profile {
            version: PROFILE_VERSION,
            commands: self
                .commands
                .values()
                .map(|c| CommandDef {
                    id: Some(c.id().get()),
                    aliases: c.aliases().iter().cloned().collect(),
                    actions: c.actions().to_vec(),
                    enabled: c.is_enabled(),
                })
                .collect(),
        }
    }

    /// Hand out the next unused id. Ids never wrap around, and `u64::MAX` is
    /// never handed out so saved profiles always load back.
    fn allocate_id(&mut self) -> Result<CommandId, RuleSetError> {
        let mut candidate = self.next_id.max(1);
        loop {
            if candidate == u64::MAX {
                return Err(RuleSetError::IdsExhausted);
            }
            if !self.commands.contains_key(&CommandId::new(candidate)) {
                break;
            }
            candidate += 1;
        }
        self.next_id = candidate + 1;
        Ok(CommandId::new(candidate))
    }

    /// Insert `command`, taking over any alias another command owns.
    fn claim(&mut self, command: Command) -> Vec<DuplicateAliasWarning> {
        let id = command.id();
        let mut warnings = Vec::new();

        for alias in command.aliases() {
            let previous = match self.owners.insert(alias.clone(), id) {
                Some(previous) if previous != id => previous,
                _ => continue,
            };
            let Some(old) = self.commands.get(&previous) else {
                continue;
            };
            let stripped = old.without_alias(alias);
            if old.is_enabled() && !stripped.is_enabled() {
                warn!(
                    target: "chatplays::rules",
                    command = %previous,
                    "command lost its last alias and was disabled"
                );
            }
            self.commands.insert(previous, stripped);

            let warning = DuplicateAliasWarning {
                alias: alias.clone(),
                previous,
                claimed_by: id,
            };
            warn!(target: "chatplays::rules", "{warning}");
            warnings.push(warning);
        }

        self.commands.insert(id, command);
        warnings
    }

    /// Rebuild `owners`, `index` and `matcher` from `commands`.
    fn reindex(&mut self) {
        self.owners.clear();
        self.index.clear();
        for command in self.commands.values() {
            for alias in command.aliases() {
                self.owners.insert(alias.clone(), command.id());
                if command.is_enabled() {
                    self.index.insert(alias.clone(), command.id());
                }
            }
        }
        self.matcher = AliasMatcher::build(
            self.index
                .iter()
                .map(|(alias, id)| (alias.clone(), *id)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Key;
    use crate::matching::match_message;

    fn press(c: char) -> Vec<Action> {
        vec![Action::KeyPress {
            key: Key::Char(c),
            hold_ms: 0,
        }]
    }

    #[test]
    fn test_add_assigns_fresh_ids() {
        let mut rules = RuleSet::new();
        let (a, _) = rules.add_command(["a"], press('a')).unwrap();
        let (b, _) = rules.add_command(["b"], press('b')).unwrap();
        assert_ne!(a, b);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.lookup("A").map(Command::id), Some(a));
    }

    #[test]
    fn test_add_rejects_blank_aliases() {
        let mut rules = RuleSet::new();
        assert_eq!(
            rules.add_command(["", "   "], press('a')),
            Err(RuleSetError::EmptyAliases)
        );
        assert!(rules.is_empty());
    }

    #[test]
    fn test_duplicate_alias_is_reassigned_with_warning() {
        let mut rules = RuleSet::new();
        let (first, _) = rules.add_command(["jump", "hop"], press('a')).unwrap();
        let (second, warnings) = rules.add_command(["JUMP"], press('b')).unwrap();

        assert_eq!(
            warnings,
            vec![DuplicateAliasWarning {
                alias: "jump".into(),
                previous: first,
                claimed_by: second,
            }]
        );
        assert_eq!(rules.lookup("jump").map(Command::id), Some(second));
        assert_eq!(rules.lookup("hop").map(Command::id), Some(first));
        assert!(!rules.get(first).unwrap().aliases().contains("jump"));
    }

    #[test]
    fn test_losing_last_alias_disables_command() {
        let mut rules = RuleSet::new();
        let (first, _) = rules.add_command(["jump"], press('a')).unwrap();
        rules.add_command(["jump"], press('b')).unwrap();

        let old = rules.get(first).unwrap();
        assert!(old.aliases().is_empty());
        assert!(!old.is_enabled());
        assert_eq!(
            rules.set_enabled(first, true),
            Err(RuleSetError::EmptyAliases)
        );
    }

    #[test]
    fn test_disabled_command_keeps_alias_reserved() {
        let mut rules = RuleSet::new();
        let (id, _) = rules.add_command(["jump"], press('a')).unwrap();
        rules.set_enabled(id, false).unwrap();

        assert!(rules.lookup("jump").is_none());
        assert!(rules.matcher().is_empty());

        let (_, warnings) = rules.add_command(["jump"], press('b')).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].previous, id);
    }

    #[test]
    fn test_remove_releases_aliases() {
        let mut rules = RuleSet::new();
        let (id, _) = rules.add_command(["jump"], press('a')).unwrap();
        let removed = rules.remove_command(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(rules.lookup("jump").is_none());
        assert_eq!(
            rules.remove_command(id),
            Err(RuleSetError::UnknownCommand(id))
        );

        let (_, warnings) = rules.add_command(["jump"], press('b')).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_update_replaces_whole_command() {
        let mut rules = RuleSet::new();
        let (id, _) = rules.add_command(["jump"], press('a')).unwrap();
        let warnings = rules.update_command(id, ["leap"], press('z')).unwrap();
        assert!(warnings.is_empty());

        assert!(rules.lookup("jump").is_none());
        let cmd = rules.lookup("leap").unwrap();
        assert_eq!(cmd.id(), id);
        assert_eq!(cmd.actions(), press('z').as_slice());
    }

    #[test]
    fn test_unknown_command_errors() {
        let mut rules = RuleSet::new();
        let ghost = CommandId::new(42);
        assert_eq!(
            rules.set_enabled(ghost, true),
            Err(RuleSetError::UnknownCommand(ghost))
        );
        assert_eq!(
            rules.update_command(ghost, ["x"], vec![]),
            Err(RuleSetError::UnknownCommand(ghost))
        );
    }

    #[test]
    fn test_load_keeps_explicit_ids_and_allocates_the_rest() {
        let raw = r#"{
            "version": 1,
            "commands": [
                {"aliases": ["left"], "actions": [], "enabled": true},
                {"id": 7, "aliases": ["right"], "actions": [], "enabled": false}
            ]
        }"#;
        let rules = RuleSet::load(raw).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.lookup("left").map(Command::id), Some(CommandId::new(8)));
        assert!(rules.lookup("right").is_none());
        assert!(!rules.get(CommandId::new(7)).unwrap().is_enabled());
    }

    #[test]
    fn test_load_rejects_malformed_input() {
        assert!(matches!(
            RuleSet::load("{\"commands\": [{\"aliases\": [\"x\"]}]}"),
            Err(LoadError::Malformed { .. })
        ));
        assert!(matches!(
            RuleSet::load("not json"),
            Err(LoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_save_then_load_answers_identically() {
        let mut rules = RuleSet::new();
        rules.add_command(["W", "forward", "go"], press('w')).unwrap();
        rules
            .add_command(
                ["go left"],
                vec![
                    Action::KeyPress {
                        key: Key::Char('a'),
                        hold_ms: 300,
                    },
                    Action::Wait { ms: 20 },
                ],
            )
            .unwrap();
        let (off, _) = rules.add_command(["sleep"], press('z')).unwrap();
        rules.set_enabled(off, false).unwrap();

        let reloaded = RuleSet::load(&rules.save().unwrap()).unwrap();
        for message in ["w", "forward", "go", "go left", "sleep", "go left then forward"] {
            assert_eq!(
                match_message(message, &rules, false),
                match_message(message, &reloaded, false),
                "{message}"
            );
        }
        assert_eq!(rules.to_profile(), reloaded.to_profile());
    }

    #[test]
    fn test_ids_near_the_top_never_wrap() {
        let top = u64::MAX - 2;
        let mut rules = RuleSet::load(&format!(
            r#"{{"commands": [{{"id": {top}, "aliases": ["a"], "enabled": true, "actions": []}}]}}"#
        ))
        .unwrap();

        let (last, _) = rules.add_command(["b"], press('b')).unwrap();
        assert_eq!(last.get(), u64::MAX - 1);
        assert_eq!(
            rules.add_command(["c"], press('c')),
            Err(RuleSetError::IdsExhausted)
        );
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.lookup("a").map(|c| c.id().get()), Some(top));

        let reloaded = RuleSet::load(&rules.save().unwrap()).unwrap();
        assert_eq!(reloaded.to_profile(), rules.to_profile());
    }

    #[test]
    fn test_load_rejects_profiles_that_run_out_of_ids() {
        let max = u64::MAX;
        let reserved = RuleSet::load(&format!(
            r#"{{"commands": [{{"id": {max}, "aliases": ["a"], "enabled": true, "actions": []}},
                {{"aliases": ["b"], "enabled": true, "actions": []}}]}}"#
        ));
        assert!(matches!(reserved, Err(LoadError::Malformed { .. })));

        let top = u64::MAX - 2;
        let crowded = RuleSet::load(&format!(
            r#"{{"commands": [{{"id": {top}, "aliases": ["a"], "enabled": true, "actions": []}},
                {{"aliases": ["b"], "enabled": true, "actions": []}},
                {{"aliases": ["c"], "enabled": true, "actions": []}}]}}"#
        ));
        assert!(matches!(crowded, Err(LoadError::Malformed { .. })));
    }
}
