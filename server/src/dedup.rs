//! Deduplication of tokens received from every connection
//!
//! The store is owned by the event loop, which is its only writer. After each
//! mutation the `(unique, duplicates)` pair is published as a whole through a
//! `watch` channel, so readers on other tasks or threads never see a torn pair.

use std::collections::HashSet;
use tokio::sync::watch;

/// Point-in-time view of the dedup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub unique: u64,
    pub duplicates: u64,
}

impl StatsSnapshot {
    /// Total number of tokens observed
    pub fn observed(&self) -> u64 {
        self.unique + self.duplicates
    }
}

/// Outcome of a single [`DedupStore::observe`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    New,
    Duplicate,
}

/// Set of unique tokens plus the count of repeated ones.
///
/// Tokens are compared as the raw decoded strings, so `"007"` and `"7"` are
/// two distinct tokens.
#[derive(Debug)]
pub struct DedupStore {
    seen: HashSet<String>,
    duplicates: u64,
    stats_tx: watch::Sender<StatsSnapshot>,
}

impl DedupStore {
    /// Creates an empty store
    ///
    /// The snapshot channel starts at zero and is published on every
    /// observation, whether or not anyone has subscribed yet.
    pub fn new() -> Self {
        let (stats_tx, _) = watch::channel(StatsSnapshot::default());
        Self {
            seen: HashSet::new(),
            duplicates: 0,
            stats_tx,
        }
    }

    /// Records a token, inserting it if absent or counting it as a duplicate
    pub fn observe(&mut self, token: &str) -> Observation {
        let outcome = if self.seen.contains(token) {
            self.duplicates += 1;
            Observation::Duplicate
        } else {
            self.seen.insert(token.to_owned());
            Observation::New
        };

        self.stats_tx.send_replace(self.snapshot());
        outcome
    }

    /// Returns the current `(unique, duplicates)` pair
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            unique: self.seen.len() as u64,
            duplicates: self.duplicates,
        }
    }

    /// Read-only handle on the published snapshots
    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.stats_tx.subscribe()
    }

    /// Iterates over the unique tokens in no particular order
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.seen.contains(token)
    }

    pub fn unique_count(&self) -> usize {
        self.seen.len()
    }

    pub fn duplicate_count(&self) -> u64 {
        self.duplicates
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new()
    }
}
