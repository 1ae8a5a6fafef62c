//! Cache Entry Module
//!
//! Defines the immutable value/cost pair stored for every key.

// == Cache Entry ==
/// A single cache entry: the stored value and the cost it was inserted with.
///
/// Entries are never mutated in place. Overwriting a key replaces the whole
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    cost: i64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `cost` - Caller-assigned weight counted against the total cost limit
    pub fn new(value: V, cost: i64) -> Self {
        Self { value, cost }
    }

    /// Returns a reference to the stored value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the cost this entry contributes to the cache total.
    pub fn cost(&self) -> i64 {
        self.cost
    }

    /// Consumes the entry and returns the stored value.
    pub fn into_value(self) -> V {
        self.value
    }
}
