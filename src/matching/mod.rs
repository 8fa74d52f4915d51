/*!
Matching engine: decides which commands a chat message fires.

Pipeline for one message:
1. Global disable short-circuits to no matches.
2. The message is normalized (see [`normalize`]).
3. The rule set's alias automaton scans the normalized text; only
   occurrences aligned on token boundaries count, so both one-word aliases
   (`"w"`) and phrases (`"go forward"`) match inside longer messages.
4. Overlaps resolve greedily, longest alias first at each start position.
5. Commands are returned in order of their first accepted occurrence,
   each command at most once.
*/

pub mod automaton;
pub mod normalize;

use std::collections::HashSet;

use tracing::trace;

use crate::rules::{Command, RuleSet};

pub use automaton::{AliasHit, AliasMatcher};
pub use normalize::normalize;

/// Resolve `message` against `rules`.
///
/// Returns the fired commands in first-occurrence order (possibly empty).
pub fn match_message(message: &str, rules: &RuleSet, global_disable: bool) -> Vec<Command> {
    if global_disable {
        return Vec::new();
    }

    let normalized = normalize(message);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let fired: Vec<Command> = rules
        .matcher()
        .scan(&normalized)
        .into_iter()
        .filter(|hit| seen.insert(hit.command))
        .filter_map(|hit| rules.get(hit.command).filter(|c| c.is_enabled()).cloned())
        .collect();

    trace!(
        target: "chatplays::matching",
        message = %normalized,
        fired = fired.len(),
        "message matched"
    );
    fired
}
