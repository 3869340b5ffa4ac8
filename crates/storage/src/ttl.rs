//! Expiry index for leased keys
//!
//! Maps expiry timestamp → set of store keys using a BTreeMap, so a sweep
//! only touches keys that are actually due instead of the whole keyspace.
//! Entries may be stale (the key was overwritten or deleted since); the
//! sweeper re-checks the live entry before removing anything.

use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use velostore_core::Timestamp;

/// Expiry index: expires_at → keys
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    index: BTreeMap<Timestamp, FxHashSet<String>>,
}

impl ExpiryIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self {
            index: BTreeMap::new(),
        }
    }

    /// Record that `key` expires at `expires_at`
    pub fn insert(&mut self, expires_at: Timestamp, key: String) {
        self.index.entry(expires_at).or_default().insert(key);
    }

    /// Forget a previously recorded expiry
    pub fn remove(&mut self, expires_at: Timestamp, key: &str) {
        if let Some(keys) = self.index.get_mut(&expires_at) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&expires_at);
            }
        }
    }

    /// Remove and return every key due at or before `now`
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<(Timestamp, String)> {
        let due: Vec<Timestamp> = self.index.range(..=now).map(|(ts, _)| *ts).collect();
        let mut out = Vec::new();
        for ts in due {
            if let Some(keys) = self.index.remove(&ts) {
                out.extend(keys.into_iter().map(|k| (ts, k)));
            }
        }
        out
    }

    /// Total number of indexed keys
    pub fn len(&self) -> usize {
        self.index.values().map(|keys| keys.len()).sum()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
