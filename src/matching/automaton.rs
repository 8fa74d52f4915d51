//! Alias automaton.
//!
//! Every enabled alias is compiled into one Aho-Corasick automaton. A scan
//! reports all overlapping occurrences; occurrences that do not sit on token
//! boundaries are discarded, and the survivors are resolved greedily: the
//! leftmost occurrence wins, and at equal start positions the longest alias
//! wins. An accepted occurrence hides every other occurrence it overlaps.

use std::cmp::Reverse;

use aho_corasick::AhoCorasick;
use tracing::{error, trace};

use crate::rules::CommandId;

/// An accepted alias occurrence in a normalized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasHit {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    pub command: CommandId,
}

/// Compiled lookup over normalized aliases.
#[derive(Debug, Clone, Default)]
pub struct AliasMatcher {
    aliases: Vec<(String, CommandId)>,
    automaton: Option<AhoCorasick>,
}

impl AliasMatcher {
    /// Compile a matcher from `(normalized alias, owner)` pairs.
    pub fn build<I>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (String, CommandId)>,
    {
        let mut aliases: Vec<(String, CommandId)> = aliases
            .into_iter()
            .filter(|(alias, _)| !alias.is_empty())
            .collect();
        aliases.sort();

        if aliases.is_empty() {
            return Self::default();
        }

        let automaton = match AhoCorasick::new(aliases.iter().map(|(alias, _)| alias.as_str())) {
            Ok(ac) => {
                trace!(target: "chatplays::matching", count = aliases.len(), "alias automaton rebuilt");
                Some(ac)
            }
            Err(e) => {
                error!(target: "chatplays::matching", error = %e, "failed to build alias automaton");
                None
            }
        };

        Self { aliases, automaton }
    }

    /// Number of compiled aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Scan an already-normalized message and return accepted hits, left to right.
    pub fn scan(&self, normalized: &str) -> Vec<AliasHit> {
        let Some(ac) = self.automaton.as_ref() else {
            return Vec::new();
        };

        let bytes = normalized.as_bytes();
        let mut candidates: Vec<AliasHit> = ac
            .find_overlapping_iter(normalized)
            .filter(|m| on_boundary(bytes, m.start(), m.end()))
            .map(|m| AliasHit {
                start: m.start(),
                end: m.end(),
                command: self.aliases[m.pattern().as_usize()].1,
            })
            .collect();

        candidates.sort_by_key(|hit| (hit.start, Reverse(hit.end)));

        let mut accepted = Vec::new();
        let mut covered_until = 0;
        for hit in candidates {
            if hit.start < covered_until {
                continue;
            }
            covered_until = hit.end;
            accepted.push(hit);
        }
        accepted
    }
}

/// True when `[start, end)` starts and ends at token boundaries of `bytes`.
fn on_boundary(bytes: &[u8], start: usize, end: usize) -> bool {
    let starts_clean = start == 0 || bytes[start - 1] == b' ';
    let ends_clean = end == bytes.len() || bytes[end] == b' ';
    starts_clean && ends_clean
}
