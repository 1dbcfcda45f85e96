//! Identifier normalization with a per-entry replacement cache.
//!
//! Normalization runs for every row of every dataset matched against an
//! entry, and regex rewriting is the expensive step, so results are memoized
//! per ruleset kind keyed by the original, untouched value.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ruleset::{RulesetKind, Rulesets};
use crate::value::RegionValue;

/// Memoized rewrite results, one map per [`RulesetKind`].
///
/// Entries are never evicted. Once a key is stored its value is returned
/// unchanged for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct ReplacementCache {
    maps: [RwLock<HashMap<String, String>>; 4],
}

impl ReplacementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: RulesetKind, original: &str) -> Option<String> {
        self.maps[kind.index()].read().get(original).cloned()
    }

    /// Store a result and return the cached value for the key.
    ///
    /// If another thread stored the key first its value wins.
    pub fn insert(&self, kind: RulesetKind, original: String, rewritten: String) -> String {
        self.maps[kind.index()]
            .write()
            .entry(original)
            .or_insert(rewritten)
            .clone()
    }

    pub fn len(&self, kind: RulesetKind) -> usize {
        self.maps[kind.index()].read().len()
    }

    pub fn is_empty(&self) -> bool {
        RulesetKind::ALL.iter().all(|&k| self.len(k) == 0)
    }
}

/// Normalize a raw value with the ruleset for `kind`.
///
/// Absent input stays absent. Text is lowercased and trimmed, numbers are
/// written in decimal. When the ruleset is empty that is the result;
/// otherwise the rules are applied in order and the result is cached under
/// the original value.
pub fn normalize(
    raw: Option<&RegionValue>,
    kind: RulesetKind,
    rulesets: &Rulesets,
    cache: &ReplacementCache,
) -> Option<String> {
    let raw = raw?;
    let ruleset = rulesets.get(kind);
    if ruleset.is_empty() {
        return Some(raw.folded());
    }

    let original = raw.as_text();
    if let Some(hit) = cache.get(kind, &original) {
        return Some(hit);
    }

    let rewritten = ruleset.apply(&raw.folded());
    Some(cache.insert(kind, original.into_owned(), rewritten))
}
