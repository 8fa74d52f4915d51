use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::ruleset::RuleSet;

/// The live rule set, shared between editors and the dispatcher.
///
/// Readers take an `Arc` snapshot and keep using it for as long as they
/// like. Writers clone the current snapshot, edit the clone, and publish it
/// with a single pointer swap, so a reader observes either the old or the new
/// rule set in full. Writers are serialized so concurrent edits cannot lose
/// each other's changes.
#[derive(Debug, Clone)]
pub struct RuleStore {
    current: Arc<RwLock<Arc<RuleSet>>>,
    writer: Arc<Mutex<()>>,
}

impl RuleStore {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(rules))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// The currently published rule set.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Publish `rules` wholesale, returning the previous snapshot.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        let _writer = self.writer.lock();
        std::mem::replace(&mut *self.current.write(), Arc::new(rules))
    }

    /// Apply `edit` to a copy of the current rule set and publish the copy if
    /// the edit succeeds. On error nothing is published.
    pub fn update<T, E>(&self, edit: impl FnOnce(&mut RuleSet) -> Result<T, E>) -> Result<T, E> {
        let _writer = self.writer.lock();
        let mut next = RuleSet::clone(&self.snapshot());
        let out = edit(&mut next)?;
        *self.current.write() = Arc::new(next);
        Ok(out)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(RuleSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleSetError;
    use crate::rules::CommandId;

    #[test]
    fn test_snapshot_is_unaffected_by_later_edits() {
        let store = RuleStore::default();
        let before = store.snapshot();

        store
            .update(|rules| rules.add_command(["jump"], vec![]))
            .unwrap();

        assert!(before.is_empty());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_failed_edit_publishes_nothing() {
        let store = RuleStore::default();
        store
            .update(|rules| rules.add_command(["jump"], vec![]))
            .unwrap();
        let before = store.snapshot();

        let result = store.update(|rules| {
            rules.add_command(["extra"], vec![])?;
            rules.set_enabled(CommandId::new(999), false)
        });

        assert_eq!(result, Err(RuleSetError::UnknownCommand(CommandId::new(999))));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert!(store.snapshot().lookup("extra").is_none());
    }

    #[test]
    fn test_replace_returns_previous() {
        let store = RuleStore::default();
        let mut next = RuleSet::new();
        next.add_command(["left"], vec![]).unwrap();

        let previous = store.replace(next);
        assert!(previous.is_empty());
        assert!(store.snapshot().lookup("left").is_some());
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_edits() {
        let store = RuleStore::default();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        store
                            .update(|rules| rules.add_command([format!("a{i}x{j}")], vec![]))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot().len(), 200);
    }
}
