//! Cache Module
//!
//! Provides the in-memory LRU cache bounded by total cost and entry count.

mod bounded;
mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use bounded::BoundedCache;
pub use entry::CacheEntry;
pub use lru::{Iter as RecencyIter, RecencyMap};
pub use stats::CacheStats;
pub use store::CacheStore;
