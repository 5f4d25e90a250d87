use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use bazaar_core::{BazaarResult, ShopRecord, StorageError};
use tokio::time::Instant;
use tracing::trace;

use super::{CacheConfig, CacheStats};

struct CacheEntry {
    record: ShopRecord,
    expires_at: Instant,
    /// Access tick; larger is more recent.
    last_access: AtomicU64,
}

/// TTL-bounded, capacity-bounded cache of shops keyed by id.
pub struct ShopCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ShopCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a shop. Expired entries count as misses and are dropped.
    pub fn get(&self, shop_id: &str) -> BazaarResult<Option<ShopRecord>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
            match entries.get(shop_id) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                Some(entry) if now <= entry.expires_at => {
                    entry.last_access.store(self.tick(), Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.record.clone()));
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        // A writer may have refreshed the entry since the read lock was released
        if entries.get(shop_id).is_some_and(|e| now > e.expires_at) {
            entries.remove(shop_id);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            trace!(shop_id = %shop_id, "Cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Insert or replace a shop, evicting the least recently accessed
    /// entry when a new id arrives at capacity.
    pub fn set(&self, shop_id: &str, record: &ShopRecord) -> BazaarResult<()> {
        let entry = CacheEntry {
            record: record.clone(),
            expires_at: Instant::now() + self.config.ttl,
            last_access: AtomicU64::new(self.tick()),
        };

        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        if entries.len() >= self.config.capacity && !entries.contains_key(shop_id) {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(shop_id = %victim, "Evicted cache entry");
            }
        }
        entries.insert(shop_id.to_string(), entry);
        Ok(())
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, shop_id: &str) -> BazaarResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.remove(shop_id).is_some())
    }

    pub fn clear(&self) -> BazaarResult<()> {
        self.entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Number of entries held, expired ones not yet dropped included.
    pub fn size(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Copy of an entry regardless of expiry, without touching recency or stats.
    pub fn snapshot(&self, shop_id: &str) -> BazaarResult<Option<ShopRecord>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(shop_id).map(|e| e.record.clone()))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entry_count: self.size() as u64,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_test_utils::shop_fixture;
    use std::time::Duration;

    fn cache(capacity: usize, ttl_secs: u64) -> ShopCache {
        ShopCache::new(
            CacheConfig::new()
                .with_capacity(capacity)
                .with_ttl(Duration::from_secs(ttl_secs)),
        )
    }

    #[test]
    fn test_get_returns_independent_copy() {
        let cache = cache(10, 60);
        let mut shop = shop_fixture("alice-shop", "0xABC", "Alice's Goods");
        cache.set("alice-shop", &shop).unwrap();

        shop.name = "Changed by caller".to_string();
        let mut hit = cache.get("alice-shop").unwrap().unwrap();
        assert_eq!(hit.name, "Alice's Goods");

        hit.owner = "0xEVIL".to_string();
        assert_eq!(cache.get("alice-shop").unwrap().unwrap().owner, "0xABC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = cache(10, 5);
        cache.set("a", &shop_fixture("a", "o", "A")).unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get("a").unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("a").unwrap().is_none());
        assert_eq!(cache.size(), 0);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_expiry() {
        let cache = cache(10, 5);
        cache.set("a", &shop_fixture("a", "o", "A")).unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.set("a", &shop_fixture("a", "o", "A2")).unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get("a").unwrap().unwrap().name, "A2");
    }

    #[test]
    fn test_capacity_evicts_least_recently_accessed() {
        let cache = cache(3, 60);
        for id in ["a", "b", "c"] {
            cache.set(id, &shop_fixture(id, "o", id)).unwrap();
        }
        // Touch "a" so "b" becomes the oldest
        assert!(cache.get("a").unwrap().is_some());

        cache.set("d", &shop_fixture("d", "o", "d")).unwrap();
        assert_eq!(cache.size(), 3);
        assert!(cache.snapshot("b").unwrap().is_none());
        for id in ["a", "c", "d"] {
            assert!(cache.snapshot(id).unwrap().is_some(), "{} should remain", id);
        }
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replacing_existing_id_does_not_evict() {
        let cache = cache(2, 60);
        cache.set("a", &shop_fixture("a", "o", "A")).unwrap();
        cache.set("b", &shop_fixture("b", "o", "B")).unwrap();
        cache.set("a", &shop_fixture("a", "o", "A2")).unwrap();

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = cache(10, 60);
        cache.set("a", &shop_fixture("a", "o", "A")).unwrap();
        cache.set("b", &shop_fixture("b", "o", "B")).unwrap();

        assert!(cache.invalidate("a").unwrap());
        assert!(!cache.invalidate("a").unwrap());
        assert!(cache.get("a").unwrap().is_none());

        cache.clear().unwrap();
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_ignores_expiry() {
        let cache = cache(10, 1);
        cache.set("a", &shop_fixture("a", "o", "A")).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(cache.snapshot("a").unwrap().is_some());
        assert_eq!(cache.stats().hits + cache.stats().misses, 0);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
