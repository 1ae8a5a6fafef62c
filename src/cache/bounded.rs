//! Bounded Cache Module
//!
//! Thread-safe cache handle serializing every operation on a [`CacheStore`].

use std::hash::Hash;
use std::sync::Arc;

use indexmap::Equivalent;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::pressure::{MemoryPressureSource, MemoryPressureTrigger, PressureMask, TriggerState};

// == Bounded Cache ==
/// Concurrent LRU cache bounded by total cost and entry count.
///
/// Every operation acquires the same lock, so an insert and its trim pass,
/// or a lookup and its promotion, are never observed half done. Operations
/// that only read take the lock shared.
///
/// The cache is not `Clone`; share it through an `Arc`. Dropping it cancels
/// its memory pressure subscription.
///
/// # Example
/// ```
/// use bounded_cache::BoundedCache;
///
/// tokio_test::block_on(async {
///     let cache = BoundedCache::new(100, 5, false);
///
///     cache.set_value("k1".to_string(), Some("v1"), 60).await;
///     cache.set_value("k2".to_string(), Some("v2"), 50).await;
///
///     // k1 was evicted to keep the total cost within 100
///     assert_eq!(cache.value("k1").await, None);
///     assert_eq!(cache.value("k2").await, Some("v2"));
/// });
/// ```
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    /// Serialized store
    store: Arc<RwLock<CacheStore<K, V>>>,
    /// Memory pressure subscription
    trigger: MemoryPressureTrigger,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache subscribed to the process-wide pressure source.
    ///
    /// # Arguments
    /// * `total_cost_limit` - Maximum sum of entry costs
    /// * `count_limit` - Maximum number of entries
    /// * `clear_on_memory_pressure` - Whether pressure signals empty the cache
    pub fn new(total_cost_limit: i64, count_limit: usize, clear_on_memory_pressure: bool) -> Self {
        let config = CacheConfig {
            total_cost_limit,
            count_limit,
            clear_on_memory_pressure,
            ..CacheConfig::default()
        };
        Self::from_config(&config)
    }

    /// Creates a cache from configuration, subscribed to the process-wide
    /// pressure source.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_pressure_source(config, MemoryPressureSource::global())
    }

    /// Creates a cache subscribed to a specific pressure source.
    pub fn with_pressure_source(config: &CacheConfig, source: &MemoryPressureSource) -> Self {
        let mut store = CacheStore::new(config.total_cost_limit, config.count_limit);
        store.set_name(config.name.clone());
        let store = Arc::new(RwLock::new(store));

        let trigger = MemoryPressureTrigger::spawn(
            source,
            PressureMask::WARNING | PressureMask::CRITICAL,
            Arc::downgrade(&store),
            config.clear_on_memory_pressure,
        );

        debug!(
            "Cache '{}' created: total_cost_limit={}, count_limit={}, clear_on_memory_pressure={}",
            config.name, config.total_cost_limit, config.count_limit, config.clear_on_memory_pressure
        );

        Self { store, trigger }
    }

    // == Mutations ==
    /// Stores `value` under `key` with the given cost, or removes the key if
    /// `value` is None. May evict other entries.
    pub async fn set_value(&self, key: K, value: Option<V>, cost: i64) {
        self.store().write().await.set_value(key, value, cost);
    }

    /// Stores a present value. Shorthand for `set_value(key, Some(value), cost)`.
    pub async fn insert(&self, key: K, value: V, cost: i64) {
        self.store().write().await.insert(key, value, cost);
    }

    /// Returns the value for `key`, promoting it to most recently used.
    pub async fn value<Q>(&self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
        V: Clone,
    {
        self.store().write().await.value(key)
    }

    /// Removes `key` and returns its value, if it was present.
    pub async fn remove_value<Q>(&self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.store().write().await.remove_value(key)
    }

    /// Empties the cache.
    pub async fn remove_all_values(&self) {
        self.store().write().await.remove_all_values();
    }

    // == Accessors ==
    pub async fn count(&self) -> usize {
        self.store().read().await.count()
    }

    pub async fn is_empty(&self) -> bool {
        self.store().read().await.is_empty()
    }

    pub async fn is_not_empty(&self) -> bool {
        self.store().read().await.is_not_empty()
    }

    /// Returns all keys from oldest to newest without touching recency.
    pub async fn all_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.store().read().await.all_keys()
    }

    /// Returns all values from oldest to newest without touching recency.
    pub async fn all_values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.store().read().await.all_values()
    }

    pub async fn total_cost(&self) -> i128 {
        self.store().read().await.total_cost()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store().read().await.stats()
    }

    // == Name ==
    pub async fn name(&self) -> String {
        self.store().read().await.name().to_string()
    }

    pub async fn set_name(&self, name: impl Into<String>) {
        self.store().write().await.set_name(name);
    }

    // == Limits ==
    pub async fn total_cost_limit(&self) -> i64 {
        self.store().read().await.total_cost_limit()
    }

    /// Changes the total cost limit, evicting as needed before returning.
    pub async fn set_total_cost_limit(&self, limit: i64) {
        self.store().write().await.set_total_cost_limit(limit);
    }

    pub async fn count_limit(&self) -> usize {
        self.store().read().await.count_limit()
    }

    /// Changes the count limit, evicting as needed before returning.
    pub async fn set_count_limit(&self, limit: usize) {
        self.store().write().await.set_count_limit(limit);
    }

    // == Memory Pressure ==
    /// Whether a pressure signal would clear the cache right now.
    ///
    /// False once the subscription is cancelled, whatever the flag says.
    pub fn clear_on_memory_pressure(&self) -> bool {
        self.pressure_state() == TriggerState::Armed
    }

    /// Arms or disarms clearing on memory pressure.
    pub async fn set_clear_on_memory_pressure(&self, enabled: bool) {
        self.trigger.set_armed(enabled);
        let name = self.name().await;
        debug!(
            "Cache '{}': memory pressure clearing {}",
            name,
            if enabled { "armed" } else { "disarmed" }
        );
    }

    pub fn pressure_state(&self) -> TriggerState {
        self.trigger.state()
    }

    /// Every operation goes through here so a cache built outside a runtime
    /// starts its pressure listener on first use inside one.
    fn store(&self) -> &RwLock<CacheStore<K, V>> {
        self.trigger.ensure_started();
        &self.store
    }
}
