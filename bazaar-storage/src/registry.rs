//! StoreRegistry - manages shop store handle lifecycle
//!
//! Provides unified access to per-shop stores:
//! - Opens the store recorded in the metadata index, or creates one and
//!   records its address before the handle is used
//! - Caches opened handles
//! - Closes, repairs and reloads handles
//!
//! The handle map lock is only held for map operations. Backend calls run
//! outside it, serialised per shop by a single-flight gate so two callers
//! never open the same store concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bazaar_core::{
    BazaarError, BazaarResult, ShopFailure, ShopMetadata, StorageError, StoreAddress,
};
use tracing::{debug, info, warn};

use crate::backend::{BackendError, DocumentBackend, DocumentStore};
use crate::metadata::MetadataIndex;

/// Shared handle to an open shop store.
pub type StoreHandle = Arc<dyn DocumentStore>;

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Per-shop async locks, created on first use.
#[derive(Default)]
pub(crate) struct ShopGates {
    gates: Mutex<HashMap<String, Gate>>,
}

impl ShopGates {
    pub(crate) fn gate(&self, shop_id: &str) -> BazaarResult<Gate> {
        let mut gates = self.gates.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(Arc::clone(gates.entry(shop_id.to_string()).or_default()))
    }
}

pub(crate) fn unavailable(shop_id: &str, address: &StoreAddress, e: BackendError) -> BazaarError {
    StorageError::StoreUnavailable {
        shop_id: shop_id.to_string(),
        address: address.to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn not_open(shop_id: &str) -> BazaarError {
    StorageError::NotOpen {
        shop_id: shop_id.to_string(),
    }
    .into()
}

/// How a repair restored a shop's handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The recorded store opened and loaded cleanly.
    Reopened,
    /// A fresh, empty store replaced the recorded one.
    Recreated { previous: Option<StoreAddress> },
}

/// Result of reconnecting every known shop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconnectReport {
    pub opened: Vec<String>,
    pub failed: Vec<ShopFailure>,
}

impl ReconnectReport {
    /// Escalate to an aggregate error when every known shop failed.
    pub fn into_result(self, operation: &str) -> BazaarResult<Self> {
        if self.opened.is_empty() && !self.failed.is_empty() {
            return Err(BazaarError::Aggregate {
                operation: operation.to_string(),
                failures: self.failed,
            });
        }
        Ok(self)
    }
}

/// Manages shop store lifecycle and caching
pub struct StoreRegistry {
    backend: Arc<dyn DocumentBackend>,
    index: Arc<MetadataIndex>,
    load_depth: Option<usize>,
    handles: RwLock<HashMap<String, StoreHandle>>,
    gates: ShopGates,
}

impl StoreRegistry {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        index: Arc<MetadataIndex>,
        load_depth: Option<usize>,
    ) -> Self {
        Self {
            backend,
            index,
            load_depth,
            handles: RwLock::new(HashMap::new()),
            gates: ShopGates::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn cached(&self, shop_id: &str) -> BazaarResult<Option<StoreHandle>> {
        let handles = self.handles.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(handles.get(shop_id).cloned())
    }

    fn insert(&self, shop_id: &str, handle: StoreHandle) -> BazaarResult<()> {
        let mut handles = self.handles.write().map_err(|_| StorageError::LockPoisoned)?;
        handles.insert(shop_id.to_string(), handle);
        Ok(())
    }

    fn take(&self, shop_id: &str) -> BazaarResult<Option<StoreHandle>> {
        let mut handles = self.handles.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(handles.remove(shop_id))
    }

    fn gate(&self, shop_id: &str) -> BazaarResult<Gate> {
        self.gates.gate(shop_id)
    }

    /// Get a shop's store handle, opening or creating it if not already cached
    pub async fn get_or_create(&self, shop_id: &str) -> BazaarResult<StoreHandle> {
        self.acquire(shop_id, true).await
    }

    /// Get a shop's store handle, opening the recorded store if needed.
    ///
    /// Never allocates: fails with `NotFound` when the index has no entry
    /// or the entry records no store.
    pub async fn get_or_open(&self, shop_id: &str) -> BazaarResult<StoreHandle> {
        self.acquire(shop_id, false).await
    }

    async fn acquire(&self, shop_id: &str, allocate: bool) -> BazaarResult<StoreHandle> {
        if let Some(handle) = self.cached(shop_id)? {
            return Ok(handle);
        }

        let gate = self.gate(shop_id)?;
        let _flight = gate.lock().await;
        // Another caller may have finished opening while we waited
        if let Some(handle) = self.cached(shop_id)? {
            return Ok(handle);
        }

        let handle = self.open_or_create(shop_id, allocate).await?;
        self.insert(shop_id, Arc::clone(&handle))?;
        Ok(handle)
    }

    async fn open_or_create(&self, shop_id: &str, allocate: bool) -> BazaarResult<StoreHandle> {
        let meta = self.index.get(shop_id).await?;
        let recorded = meta.as_ref().and_then(|m| m.storage_address.clone());
        if recorded.is_none() && !allocate {
            return Err(BazaarError::not_found(shop_id));
        }

        let handle: StoreHandle = match recorded {
            Some(address) => {
                let store = self
                    .backend
                    .open(&address)
                    .await
                    .map_err(|e| unavailable(shop_id, &address, e))?;
                debug!(shop_id = %shop_id, address = %address, "Opened shop store");
                Arc::from(store)
            }
            None => {
                let handle = self.create_store(shop_id).await?;
                let address = handle.address().clone();
                let updated = match meta {
                    Some(mut meta) => {
                        meta.storage_address = Some(address.clone());
                        meta
                    }
                    None => ShopMetadata::unnamed(shop_id, address.clone()),
                };
                self.record_address(shop_id, &handle, &updated).await?;
                info!(
                    shop_id = %shop_id,
                    address = %address,
                    backend = self.backend.name(),
                    "Created shop store"
                );
                handle
            }
        };

        self.load(shop_id, &handle).await?;
        Ok(handle)
    }

    async fn create_store(&self, shop_id: &str) -> BazaarResult<StoreHandle> {
        let store = self
            .backend
            .create(shop_id)
            .await
            .map_err(|e| BazaarError::backend(format!("create store for {}", shop_id), e))?;
        Ok(Arc::from(store))
    }

    /// Save `meta` pointing at `handle`; the handle is released if the save fails.
    async fn record_address(
        &self,
        shop_id: &str,
        handle: &StoreHandle,
        meta: &ShopMetadata,
    ) -> BazaarResult<()> {
        if let Err(e) = self.index.save(meta).await {
            if let Err(close_err) = handle.close().await {
                warn!(shop_id = %shop_id, error = %close_err, "Failed to release unrecorded store");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn load(&self, shop_id: &str, handle: &StoreHandle) -> BazaarResult<()> {
        match handle.load(self.load_depth).await {
            Ok(documents) => {
                debug!(shop_id = %shop_id, documents, "Loaded shop store");
                Ok(())
            }
            Err(e) => {
                let err = unavailable(shop_id, handle.address(), e);
                if let Err(close_err) = handle.close().await {
                    debug!(shop_id = %shop_id, error = %close_err, "Close after failed load");
                }
                Err(err)
            }
        }
    }

    /// Close a shop's handle and drop it from the registry.
    ///
    /// Returns `NotOpen` when no handle is cached for `shop_id`.
    pub async fn close(&self, shop_id: &str) -> BazaarResult<()> {
        let gate = self.gate(shop_id)?;
        let _flight = gate.lock().await;

        let handle = self.take(shop_id)?.ok_or_else(|| not_open(shop_id))?;
        handle
            .close()
            .await
            .map_err(|e| BazaarError::backend(format!("close store for {}", shop_id), e))?;
        info!(shop_id = %shop_id, address = %handle.address(), "Closed shop store");
        Ok(())
    }

    /// Close any open handle and delete the index entry, as one step with
    /// respect to opens of the same shop.
    ///
    /// Close failures are logged. Returns whether an index entry existed.
    pub async fn remove(&self, shop_id: &str) -> BazaarResult<bool> {
        let gate = self.gate(shop_id)?;
        let _flight = gate.lock().await;

        match self.take(shop_id)? {
            Some(handle) => match handle.close().await {
                Ok(()) => info!(shop_id = %shop_id, address = %handle.address(), "Closed shop store"),
                Err(e) => warn!(shop_id = %shop_id, error = %e, "Failed to close store during removal"),
            },
            None => debug!(shop_id = %shop_id, "No open handle to close"),
        }
        self.index.delete(shop_id).await
    }

    /// Best-effort recovery of a shop's handle.
    ///
    /// Closes any cached handle, then tries the recorded store. If it will
    /// not open or load, a fresh store is created and recorded in its place.
    /// On failure the shop is left without a cached handle.
    pub async fn repair(&self, shop_id: &str) -> BazaarResult<RepairOutcome> {
        let gate = self.gate(shop_id)?;
        let _flight = gate.lock().await;

        if let Some(handle) = self.take(shop_id)? {
            if let Err(e) = handle.close().await {
                warn!(shop_id = %shop_id, error = %e, "Close before repair failed");
            }
        }

        let meta = self
            .index
            .get(shop_id)
            .await?
            .ok_or_else(|| BazaarError::not_found(shop_id))?;

        if let Some(address) = meta.storage_address.clone() {
            match self.backend.open(&address).await {
                Ok(store) => {
                    let handle: StoreHandle = Arc::from(store);
                    match self.load(shop_id, &handle).await {
                        Ok(()) => {
                            self.insert(shop_id, handle)?;
                            info!(shop_id = %shop_id, address = %address, "Repaired shop store by reopening");
                            return Ok(RepairOutcome::Reopened);
                        }
                        Err(e) => {
                            warn!(shop_id = %shop_id, error = %e, "Recorded store failed to load, recreating");
                        }
                    }
                }
                Err(e) => {
                    warn!(shop_id = %shop_id, address = %address, error = %e, "Recorded store failed to open, recreating");
                }
            }
        }

        let previous = meta.storage_address.clone();
        let handle = self.create_store(shop_id).await?;
        let mut updated = meta;
        updated.storage_address = Some(handle.address().clone());
        self.record_address(shop_id, &handle, &updated).await?;
        self.load(shop_id, &handle).await?;
        info!(
            shop_id = %shop_id,
            address = %handle.address(),
            previous = ?previous,
            "Repaired shop store by recreating"
        );
        self.insert(shop_id, handle)?;
        Ok(RepairOutcome::Recreated { previous })
    }

    /// Open a handle for every shop in the metadata index.
    ///
    /// Failures are collected and logged rather than returned; see
    /// [`ReconnectReport::into_result`].
    pub async fn reconnect_all(&self) -> BazaarResult<ReconnectReport> {
        let ids = self.index.list_ids().await?;
        let mut report = ReconnectReport::default();
        for shop_id in ids {
            match self.get_or_open(&shop_id).await {
                Ok(_) => report.opened.push(shop_id),
                Err(error) => {
                    warn!(shop_id = %shop_id, error = %error, "Failed to reconnect shop store");
                    report.failed.push(ShopFailure { shop_id, error });
                }
            }
        }
        info!(
            opened = report.opened.len(),
            failed = report.failed.len(),
            "Reconnected shop stores"
        );
        Ok(report)
    }

    /// Close every open handle, clear the registry and reconnect from the index.
    pub async fn reload_all(&self) -> BazaarResult<ReconnectReport> {
        let closed = self.close_all().await?;
        info!(closed, "Closed shop stores for reload");
        self.reconnect_all().await
    }

    /// Close every open handle. Close failures are logged, not returned.
    ///
    /// Returns the number of handles that were open.
    pub async fn close_all(&self) -> BazaarResult<usize> {
        let drained: Vec<(String, StoreHandle)> = {
            let mut handles = self.handles.write().map_err(|_| StorageError::LockPoisoned)?;
            handles.drain().collect()
        };
        let count = drained.len();
        for (shop_id, handle) in drained {
            let gate = self.gate(&shop_id)?;
            let _flight = gate.lock().await;
            if let Err(e) = handle.close().await {
                warn!(shop_id = %shop_id, error = %e, "Failed to close shop store");
            }
        }
        Ok(count)
    }

    /// Check if a shop has a cached handle
    pub fn is_open(&self, shop_id: &str) -> bool {
        let Ok(handles) = self.handles.read() else {
            return false;
        };
        handles.contains_key(shop_id)
    }

    /// Identifiers with a cached handle, sorted.
    pub fn open_ids(&self) -> BazaarResult<Vec<String>> {
        let handles = self.handles.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut ids: Vec<String> = handles.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub fn len(&self) -> usize {
        self.handles.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use tempfile::TempDir;

    async fn create_test_registry() -> (StoreRegistry, MemoryBackend, Arc<MetadataIndex>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let index = Arc::new(
            MetadataIndex::open(temp_dir.path().join("metadata"))
                .await
                .expect("index should open"),
        );
        let backend = MemoryBackend::new();
        let registry = StoreRegistry::new(Arc::new(backend.clone()), Arc::clone(&index), None);
        (registry, backend, index, temp_dir)
    }

    #[tokio::test]
    async fn test_get_or_create_records_address_first() {
        let (registry, backend, index, _temp_dir) = create_test_registry().await;

        let handle = registry.get_or_create("alice-shop").await.unwrap();
        let meta = index.get("alice-shop").await.unwrap().unwrap();
        assert_eq!(meta.storage_address.as_ref(), Some(handle.address()));
        assert!(registry.is_open("alice-shop"));

        // Fast path reuses the cached handle
        let again = registry.get_or_create("alice-shop").await.unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
        assert_eq!(backend.open_count(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_opens_recorded_address() {
        let (registry, backend, index, _temp_dir) = create_test_registry().await;
        let address = registry.get_or_create("a").await.unwrap().address().clone();
        registry.close("a").await.unwrap();

        let handle = registry.get_or_create("a").await.unwrap();
        assert_eq!(handle.address(), &address);
        assert_eq!(backend.store_count().unwrap(), 1);
        assert_eq!(
            index.get("a").await.unwrap().unwrap().storage_address,
            Some(address)
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_distinct_error() {
        let (registry, backend, _index, _temp_dir) = create_test_registry().await;
        let address = registry.get_or_create("a").await.unwrap().address().clone();
        registry.close("a").await.unwrap();

        backend.mark_unavailable(&address).unwrap();
        let err = registry.get_or_create("a").await.err().unwrap();
        assert!(err.is_store_unavailable());
        assert!(!registry.is_open("a"));
    }

    #[tokio::test]
    async fn test_get_or_open_never_allocates() {
        let (registry, backend, index, _temp_dir) = create_test_registry().await;

        assert!(registry.get_or_open("ghost").await.err().unwrap().is_not_found());
        assert!(index.get("ghost").await.unwrap().is_none());
        assert_eq!(backend.store_count().unwrap(), 0);

        let address = registry.get_or_create("a").await.unwrap().address().clone();
        registry.close("a").await.unwrap();
        let reopened = registry.get_or_open("a").await.unwrap();
        assert_eq!(reopened.address(), &address);
        assert_eq!(backend.store_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_closes_handle_and_forgets_shop() {
        let (registry, backend, index, _temp_dir) = create_test_registry().await;
        registry.get_or_create("a").await.unwrap();

        assert!(registry.remove("a").await.unwrap());
        assert!(!registry.is_open("a"));
        assert!(index.get("a").await.unwrap().is_none());
        assert_eq!(backend.open_store_count(), 0);
        assert!(registry.get_or_open("a").await.err().unwrap().is_not_found());

        assert!(!registry.remove("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_close_twice_is_not_open() {
        let (registry, backend, _index, _temp_dir) = create_test_registry().await;
        registry.get_or_create("a").await.unwrap();

        registry.close("a").await.unwrap();
        let err = registry.close("a").await.unwrap_err();
        assert!(err.is_not_open());
        assert_eq!(backend.open_store_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_opens_once() {
        let (registry, backend, _index, _temp_dir) = create_test_registry().await;
        let registry = Arc::new(registry);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.spawn(async move { registry.get_or_create("race").await.map(|h| h.address().clone()) });
        }
        let mut addresses = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            addresses.push(joined.unwrap().unwrap());
        }

        addresses.dedup();
        assert_eq!(addresses.len(), 1);
        assert_eq!(backend.store_count().unwrap(), 1);
        assert_eq!(backend.open_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_reopens_healthy_store() {
        let (registry, _backend, _index, _temp_dir) = create_test_registry().await;
        registry.get_or_create("a").await.unwrap();

        let outcome = registry.repair("a").await.unwrap();
        assert_eq!(outcome, RepairOutcome::Reopened);
        assert!(registry.is_open("a"));
    }

    #[tokio::test]
    async fn test_repair_recreates_lost_store() {
        let (registry, backend, index, _temp_dir) = create_test_registry().await;
        let old = registry.get_or_create("a").await.unwrap().address().clone();
        registry.close("a").await.unwrap();
        backend.destroy(&old).unwrap();

        assert!(registry.get_or_create("a").await.err().unwrap().is_store_unavailable());

        let outcome = registry.repair("a").await.unwrap();
        assert_eq!(
            outcome,
            RepairOutcome::Recreated {
                previous: Some(old.clone())
            }
        );
        let recorded = index.get("a").await.unwrap().unwrap().storage_address.unwrap();
        assert_ne!(recorded, old);
        assert!(registry.is_open("a"));
    }

    #[tokio::test]
    async fn test_repair_unknown_shop_is_not_found() {
        let (registry, _backend, _index, _temp_dir) = create_test_registry().await;
        assert!(registry.repair("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reload_all_survives_one_bad_store() {
        let (registry, backend, _index, _temp_dir) = create_test_registry().await;
        registry.get_or_create("a").await.unwrap();
        let bad = registry.get_or_create("b").await.unwrap().address().clone();
        registry.get_or_create("c").await.unwrap();
        backend.mark_unavailable(&bad).unwrap();

        let report = registry.reload_all().await.unwrap();
        assert_eq!(report.opened, vec!["a", "c"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].shop_id, "b");
        assert_eq!(registry.open_ids().unwrap(), vec!["a", "c"]);
        assert!(report.into_result("reload_all").is_ok());
    }

    #[tokio::test]
    async fn test_reconnect_report_all_failed_is_aggregate() {
        let (registry, backend, _index, _temp_dir) = create_test_registry().await;
        let address = registry.get_or_create("a").await.unwrap().address().clone();
        registry.close_all().await.unwrap();
        backend.mark_unavailable(&address).unwrap();

        let report = registry.reconnect_all().await.unwrap();
        let err = report.into_result("reconnect_all").unwrap_err();
        assert!(matches!(err, BazaarError::Aggregate { ref failures, .. } if failures.len() == 1));
        assert!(registry.is_empty());
    }
}
