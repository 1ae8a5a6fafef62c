//! Cache Statistics Module
//!
//! Tracks cache activity including hits, misses, evictions and clears.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache activity counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of lookups that found their key
    pub hits: u64,
    /// Number of lookups for absent keys
    pub misses: u64,
    /// Number of values stored (overwrites included)
    pub insertions: u64,
    /// Number of explicit removals that found their key
    pub removals: u64,
    /// Number of entries evicted by a trim pass
    pub evictions: u64,
    /// Number of full clears, whatever triggered them
    pub clears: u64,
    /// Number of full clears caused by memory pressure
    pub pressure_clears: u64,
    /// When the cache was last fully cleared
    pub last_cleared_at: Option<DateTime<Utc>>,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current sum of entry costs
    pub total_cost: i128,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_insertion(&mut self) {
        self.insertions += 1;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    /// Adds `count` entries evicted by a single trim pass.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    // == Record Clear ==
    /// Counts a full clear and stamps its time.
    pub fn record_clear(&mut self) {
        self.clears += 1;
        self.last_cleared_at = Some(Utc::now());
    }

    pub fn record_pressure_clear(&mut self) {
        self.pressure_clears += 1;
    }

    // == Update Gauges ==
    /// Updates the current entry count and total cost.
    pub fn set_gauges(&mut self, total_entries: usize, total_cost: i128) {
        self.total_entries = total_entries;
        self.total_cost = total_cost;
    }
}
