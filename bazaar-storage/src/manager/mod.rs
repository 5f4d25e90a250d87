//! Shop manager: the façade over index, registry and cache.
//!
//! Reads go cache first, then metadata index, then the shop's store.
//! Writes validate, write the document through the store handle, record the
//! metadata and refresh the cache.

mod listing;
mod transfer;

use std::sync::Arc;

use bazaar_core::{
    validate_shop_id, BazaarConfig, BazaarError, BazaarResult, ShopRecord, StorageError,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::backend::{DocumentBackend, DocumentPredicate, DocumentRef, LmdbBackend};
use crate::cache::{CacheConfig, CacheStats, ShopCache};
use crate::document::{decode_shop, encode_shop, shop_key};
use crate::metadata::MetadataIndex;
use crate::registry::{
    unavailable, ReconnectReport, RepairOutcome, ShopGates, StoreHandle, StoreRegistry,
};

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStats {
    /// Shops present in the metadata index.
    pub known_shops: usize,
    /// Shops with an open store handle.
    pub open_handles: usize,
    pub backend: &'static str,
    pub cache: CacheStats,
}

/// Entry point for shop persistence.
///
/// Cheap to clone; clones share the same index, registry and cache.
#[derive(Clone)]
pub struct ShopManager {
    index: Arc<MetadataIndex>,
    registry: Arc<StoreRegistry>,
    cache: Arc<ShopCache>,
    /// Serialises create, update, delete, repair and import per shop.
    writes: Arc<ShopGates>,
    list_concurrency: usize,
}

impl ShopManager {
    /// Build a manager over `backend`, with the metadata index under
    /// `config.metadata_dir()`.
    pub async fn new(config: &BazaarConfig, backend: Arc<dyn DocumentBackend>) -> BazaarResult<Self> {
        config.validate()?;
        let index = Arc::new(MetadataIndex::open(config.metadata_dir()).await?);
        let registry = Arc::new(StoreRegistry::new(
            backend,
            Arc::clone(&index),
            config.load_depth,
        ));
        let cache = Arc::new(ShopCache::new(CacheConfig::from_config(config)));
        info!(
            data_dir = %config.data_dir.display(),
            backend = registry.backend_name(),
            cache_capacity = config.cache_capacity,
            list_concurrency = config.list_concurrency,
            "Shop manager ready"
        );
        Ok(Self {
            index,
            registry,
            cache,
            writes: Arc::new(ShopGates::default()),
            list_concurrency: config.list_concurrency,
        })
    }

    /// Build a manager storing shops in LMDB under `config.stores_dir()`.
    pub async fn open_lmdb(config: &BazaarConfig) -> BazaarResult<Self> {
        let backend = LmdbBackend::new(config.stores_dir(), config.lmdb_map_size_mb)?;
        Self::new(config, Arc::new(backend)).await
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ShopCache {
        &self.cache
    }

    // ========================================================================
    // Single-shop operations
    // ========================================================================

    /// Fetch a shop, serving from cache when possible.
    pub async fn get_shop(&self, shop_id: &str) -> BazaarResult<ShopRecord> {
        validate_shop_id(shop_id)?;
        if let Some(shop) = self.cache.get(shop_id)? {
            return Ok(shop);
        }
        if self.index.get(shop_id).await?.is_none() {
            return Err(BazaarError::not_found(shop_id));
        }

        let shop = match self.fetch(shop_id).await {
            Ok(shop) => shop,
            Err(e) => {
                // A delete may have closed the store under us
                if self.index.contains(shop_id).await? {
                    return Err(e);
                }
                debug!(shop_id = %shop_id, error = %e, "Shop deleted during read");
                return Err(BazaarError::not_found(shop_id));
            }
        };
        self.cache.set(shop_id, &shop)?;
        // Delete removes the index entry before dropping the cache entry, so
        // either it drops ours or we see the entry gone here.
        if !self.index.contains(shop_id).await? {
            self.cache.invalidate(shop_id)?;
            return Err(BazaarError::not_found(shop_id));
        }
        Ok(shop)
    }

    async fn fetch(&self, shop_id: &str) -> BazaarResult<ShopRecord> {
        let handle = self.registry.get_or_open(shop_id).await?;
        self.read_record(shop_id, &handle)
            .await?
            .ok_or_else(|| BazaarError::not_found(shop_id))
    }

    /// Take the write lock for `shop_id`.
    async fn lock_writes(&self, shop_id: &str) -> BazaarResult<OwnedMutexGuard<()>> {
        Ok(self.writes.gate(shop_id)?.lock_owned().await)
    }

    /// Persist a new shop. Fails with `AlreadyExists` if the id is taken.
    pub async fn create_shop(&self, mut shop: ShopRecord) -> BazaarResult<ShopRecord> {
        shop.validate()?;
        let _writes = self.lock_writes(&shop.id).await?;
        // An entry without an owner is a store allocated for a shop that was never saved
        if let Some(meta) = self.index.get(&shop.id).await? {
            if !meta.owner.is_empty() {
                return Err(StorageError::AlreadyExists { shop_id: shop.id }.into());
            }
        }

        let now = Utc::now();
        shop.created_at = now;
        shop.updated_at = now;

        let handle = self.registry.get_or_create(&shop.id).await?;
        let shop = self.persist(&handle, shop).await?;
        info!(shop_id = %shop.id, owner = %shop.owner, "Created shop");
        Ok(shop)
    }

    /// Replace an existing shop, keeping its stored creation time.
    pub async fn update_shop(&self, mut shop: ShopRecord) -> BazaarResult<ShopRecord> {
        shop.validate()?;
        let _writes = self.lock_writes(&shop.id).await?;
        if self.index.get(&shop.id).await?.is_none() {
            return Err(BazaarError::not_found(&shop.id));
        }

        let handle = self.registry.get_or_open(&shop.id).await?;
        let existing = self
            .read_record(&shop.id, &handle)
            .await?
            .ok_or_else(|| BazaarError::not_found(&shop.id))?;
        shop.created_at = existing.created_at;
        shop.updated_at = Utc::now();

        let shop = self.persist(&handle, shop).await?;
        debug!(shop_id = %shop.id, "Updated shop");
        Ok(shop)
    }

    /// Create or update depending on whether the shop exists.
    pub async fn save_shop(&self, shop: ShopRecord) -> BazaarResult<ShopRecord> {
        let exists = matches!(
            self.index.get(&shop.id).await?,
            Some(meta) if !meta.owner.is_empty()
        );
        if exists {
            self.update_shop(shop).await
        } else {
            self.create_shop(shop).await
        }
    }

    /// Remove a shop: its document, handle, index entry and cache entry.
    ///
    /// Fails with `NotFound` if the shop was never created. An unreachable
    /// store does not block deletion; the index entry is removed regardless.
    pub async fn delete_shop(&self, shop_id: &str) -> BazaarResult<()> {
        validate_shop_id(shop_id)?;
        let _writes = self.lock_writes(shop_id).await?;
        let meta = self
            .index
            .get(shop_id)
            .await?
            .ok_or_else(|| BazaarError::not_found(shop_id))?;

        match self.registry.get_or_open(shop_id).await {
            Ok(handle) => {
                handle
                    .delete(&DocumentRef::new(shop_key(shop_id)))
                    .await
                    .map_err(|e| BazaarError::backend(format!("delete shop {}", shop_id), e))?;
            }
            Err(e) if e.is_store_unavailable() => {
                warn!(shop_id = %shop_id, error = %e, "Store unavailable, removing shop from index only");
            }
            // Entry without a store: nothing to delete from
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.registry.remove(shop_id).await?;
        self.cache.invalidate(shop_id)?;
        info!(shop_id = %shop_id, address = ?meta.storage_address, "Deleted shop");
        Ok(())
    }

    async fn read_record(
        &self,
        shop_id: &str,
        handle: &StoreHandle,
    ) -> BazaarResult<Option<ShopRecord>> {
        let docs = handle
            .query(&DocumentPredicate::Key(shop_key(shop_id)))
            .await
            .map_err(|e| unavailable(shop_id, handle.address(), e))?;
        docs.first()
            .map(|doc| decode_shop(doc, handle.address()))
            .transpose()
    }

    /// Write `shop` through `handle`, then record metadata and refresh the cache.
    async fn persist(&self, handle: &StoreHandle, mut shop: ShopRecord) -> BazaarResult<ShopRecord> {
        shop.storage_address = Some(handle.address().clone());
        let document = encode_shop(&shop)?;
        handle
            .put(document)
            .await
            .map_err(|e| BazaarError::backend(format!("write shop {}", shop.id), e))?;
        self.index.save(&shop.metadata()).await?;
        self.cache.set(&shop.id, &shop)?;
        Ok(shop)
    }

    // ========================================================================
    // Handle lifecycle
    // ========================================================================

    /// Close a shop's store handle. Returns `NotOpen` if none is open.
    pub async fn close_shop(&self, shop_id: &str) -> BazaarResult<()> {
        validate_shop_id(shop_id)?;
        self.registry.close(shop_id).await
    }

    /// Recover a shop whose store fails to open or load.
    ///
    /// If the store had to be recreated and the cache still holds a copy of
    /// the shop, that copy is written into the new store.
    pub async fn repair_shop(&self, shop_id: &str) -> BazaarResult<RepairOutcome> {
        validate_shop_id(shop_id)?;
        let _writes = self.lock_writes(shop_id).await?;
        let snapshot = self.cache.snapshot(shop_id)?;
        let outcome = self.registry.repair(shop_id).await?;

        if let RepairOutcome::Recreated { previous } = &outcome {
            match snapshot {
                Some(shop) => {
                    let handle = self.registry.get_or_open(shop_id).await?;
                    self.persist(&handle, shop).await?;
                    info!(shop_id = %shop_id, previous = ?previous, "Restored shop from cached copy");
                }
                None => {
                    self.cache.invalidate(shop_id)?;
                    warn!(shop_id = %shop_id, previous = ?previous, "Store recreated empty, no cached copy to restore");
                }
            }
        }
        Ok(outcome)
    }

    /// Open a handle for every known shop.
    ///
    /// Errors only when every shop failed; partial failures are in the report.
    pub async fn reconnect_all(&self) -> BazaarResult<ReconnectReport> {
        self.registry
            .reconnect_all()
            .await?
            .into_result("reconnect_all")
    }

    /// Close every handle, drop the cache and reconnect from the index.
    pub async fn reload_all(&self) -> BazaarResult<ReconnectReport> {
        let report = self.registry.reload_all().await?;
        self.cache.clear()?;
        report.into_result("reload_all")
    }

    /// Close every open handle and drop the cache.
    pub async fn shutdown(&self) -> BazaarResult<()> {
        let closed = self.registry.close_all().await?;
        self.cache.clear()?;
        info!(closed, "Shop manager shut down");
        Ok(())
    }

    // ========================================================================
    // Cache and statistics
    // ========================================================================

    pub fn invalidate(&self, shop_id: &str) -> BazaarResult<bool> {
        self.cache.invalidate(shop_id)
    }

    pub fn clear_cache(&self) -> BazaarResult<()> {
        self.cache.clear()
    }

    pub async fn stats(&self) -> BazaarResult<ManagerStats> {
        Ok(ManagerStats {
            known_shops: self.index.list_ids().await?.len(),
            open_handles: self.registry.len(),
            backend: self.registry.backend_name(),
            cache: self.cache.stats(),
        })
    }
}
