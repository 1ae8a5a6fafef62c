//! Bounded Cache - an in-memory LRU cache with cost and count limits
//!
//! Entries are evicted least recently used first whenever the total cost or
//! the number of entries exceeds its limit. Caches can optionally empty
//! themselves when the host reports memory pressure.

pub mod cache;
pub mod config;
pub mod error;
pub mod pressure;

pub use cache::{BoundedCache, CacheStats};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use pressure::{MemoryPressureSource, PressureLevel, TriggerState};
