//! Bounded read cache for fully materialised shops.
//!
//! Entries expire lazily: nothing sweeps in the background, an expired
//! entry is simply reported as a miss and dropped on the next read. When
//! the cache is full, inserting a new id evicts the least recently accessed
//! entry found by a linear scan. Capacities are expected to stay in the low
//! hundreds; past that an intrusive list would be the next step.
//!
//! Every read and write clones the record, so a caller mutating a returned
//! shop can never change what the cache holds.
//!
//! # Example
//!
//! ```ignore
//! let cache = ShopCache::new(CacheConfig::new().with_capacity(100));
//! cache.set("alice-shop", &shop)?;
//! let hit = cache.get("alice-shop")?;
//! ```

mod shop_cache;
mod stats;

pub use shop_cache::ShopCache;
pub use stats::CacheStats;

use std::time::Duration;

/// Configuration for the shop cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub capacity: usize,
    /// Time-to-live of an entry from its last write.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn from_config(config: &bazaar_core::BazaarConfig) -> Self {
        Self {
            capacity: config.cache_capacity,
            ttl: config.cache_ttl(),
        }
    }
}
