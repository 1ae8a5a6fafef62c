//! Cache Store Module
//!
//! Main eviction engine: recency-ordered storage bounded by a total cost
//! limit and an entry count limit.

use std::hash::Hash;

use indexmap::Equivalent;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, RecencyMap};

// == Cache Store ==
/// Single-threaded LRU store with dual-limit trimming.
///
/// After every insert and every limit change the store evicts least
/// recently used entries until `total_cost <= total_cost_limit` and
/// `count <= count_limit`. Lookups promote the key they hit; removals never
/// trim.
///
/// The store has no internal locking. [`BoundedCache`](crate::BoundedCache)
/// wraps it for concurrent use.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    /// Name used in log events
    name: String,
    /// Entries ordered from least to most recently used
    entries: RecencyMap<K, CacheEntry<V>>,
    /// Sum of the costs of all stored entries
    total_cost: i128,
    /// Maximum total cost before eviction starts
    total_cost_limit: i64,
    /// Maximum number of entries
    count_limit: usize,
    /// Activity counters
    stats: CacheStats,
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq,
{
    // == Constructor ==
    /// Creates an empty store with the given limits.
    ///
    /// # Arguments
    /// * `total_cost_limit` - Maximum sum of entry costs
    /// * `count_limit` - Maximum number of entries
    pub fn new(total_cost_limit: i64, count_limit: usize) -> Self {
        Self {
            name: String::new(),
            entries: RecencyMap::new(),
            total_cost: 0,
            total_cost_limit,
            count_limit,
            stats: CacheStats::new(),
        }
    }

    // == Name ==
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // == Set Value ==
    /// Stores `value` under `key` with the given cost.
    ///
    /// A `None` value behaves exactly like [`remove_value`](Self::remove_value).
    /// Otherwise any existing entry for the key is replaced, the new entry
    /// becomes the most recently used, and a trim pass runs. The trim pass
    /// may evict other entries, or the new entry itself if it alone breaks a
    /// limit.
    pub fn set_value(&mut self, key: K, value: Option<V>, cost: i64) {
        match value {
            Some(value) => self.insert(key, value, cost),
            None => {
                self.remove_value(&key);
            }
        }
    }

    // == Insert ==
    /// Stores a present value. See [`set_value`](Self::set_value).
    pub fn insert(&mut self, key: K, value: V, cost: i64) {
        if let Some(previous) = self.entries.insert_newest(key, CacheEntry::new(value, cost)) {
            self.total_cost -= i128::from(previous.cost());
        }
        self.total_cost += i128::from(cost);
        self.stats.record_insertion();

        self.trim_if_needed();
    }

    // == Value ==
    /// Returns a clone of the value stored under `key`.
    ///
    /// A hit promotes the key to the most recently used position.
    pub fn value<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
        V: Clone,
    {
        match self.entries.promote(key) {
            Some(entry) => {
                let value = entry.value().clone();
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Remove Value ==
    /// Removes the entry for `key` and returns its value.
    ///
    /// Returns None if the key is absent.
    pub fn remove_value<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let removed = self.entries.remove(key)?;
        self.total_cost -= i128::from(removed.cost());
        self.stats.record_removal();
        Some(removed.into_value())
    }

    // == Remove All Values ==
    /// Empties the store and resets the total cost.
    pub fn remove_all_values(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
        self.stats.record_clear();
    }

    // == Accessors ==
    /// Returns the number of stored entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    /// Returns all keys from oldest to newest.
    pub fn all_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.keys().cloned().collect()
    }

    /// Returns all values from oldest to newest.
    pub fn all_values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.entries
            .values()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Returns the current sum of entry costs.
    pub fn total_cost(&self) -> i128 {
        self.total_cost
    }

    // == Limits ==
    pub fn total_cost_limit(&self) -> i64 {
        self.total_cost_limit
    }

    pub fn count_limit(&self) -> usize {
        self.count_limit
    }

    /// Changes the total cost limit and trims to it immediately.
    pub fn set_total_cost_limit(&mut self, limit: i64) {
        self.total_cost_limit = limit;
        self.trim_if_needed();
    }

    /// Changes the count limit and trims to it immediately.
    pub fn set_count_limit(&mut self, limit: usize) {
        self.count_limit = limit;
        self.trim_if_needed();
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_gauges(self.entries.len(), self.total_cost);
        stats
    }

    pub(crate) fn record_pressure_clear(&mut self) {
        self.stats.record_pressure_clear();
    }

    /// Recomputes the total cost from the stored entries.
    #[cfg(test)]
    pub(crate) fn summed_entry_cost(&self) -> i128 {
        self.entries
            .values()
            .map(|entry| i128::from(entry.cost()))
            .sum()
    }

    // == Trim ==
    /// Evicts least recently used entries until both limits hold.
    ///
    /// Stops early only if the store runs empty, which can happen when the
    /// cost limit is negative. Each eviction is O(1).
    fn trim_if_needed(&mut self) {
        let mut evicted = 0;

        while self.exceeds_limits() {
            let Some((_, entry)) = self.entries.pop_oldest() else {
                break;
            };
            self.total_cost -= i128::from(entry.cost());
            evicted += 1;
        }

        if evicted > 0 {
            self.stats.record_evictions(evicted);
            debug!(
                "Cache '{}': evicted {} entries (count={}, total_cost={})",
                self.name,
                evicted,
                self.entries.len(),
                self.total_cost
            );
        }
    }

    fn exceeds_limits(&self) -> bool {
        self.total_cost > i128::from(self.total_cost_limit) || self.entries.len() > self.count_limit
    }
}
