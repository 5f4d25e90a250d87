//! In-memory document backend for tests and development.
//!
//! Stores survive handle close and reopen for as long as the backend (or a
//! clone of it) is alive. Individual addresses can be marked unavailable to
//! simulate an unreachable store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bazaar_core::StoreAddress;

use super::{
    new_address, BackendError, DocumentBackend, DocumentPredicate, DocumentRef, DocumentStore,
    StoredDocument,
};

type SharedDocs = Arc<RwLock<BTreeMap<String, StoredDocument>>>;

#[derive(Default)]
struct MemoryInner {
    stores: RwLock<HashMap<StoreAddress, SharedDocs>>,
    unavailable: RwLock<HashSet<StoreAddress>>,
    open_handles: AtomicUsize,
    opens: AtomicUsize,
}

impl MemoryInner {
    fn is_unavailable(&self, address: &StoreAddress) -> Result<bool, BackendError> {
        let unavailable = self.unavailable.read().map_err(|_| BackendError::Poisoned)?;
        Ok(unavailable.contains(address))
    }

    fn check_available(&self, address: &StoreAddress) -> Result<(), BackendError> {
        if self.is_unavailable(address)? {
            return Err(BackendError::Corrupted {
                address: address.clone(),
                reason: "store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Process-local [`DocumentBackend`].
///
/// Cloning shares the underlying stores.
///
/// # Example
///
/// ```rust,ignore
/// let backend = MemoryBackend::new();
/// let store = backend.create("alice-shop").await?;
/// backend.mark_unavailable(store.address());
/// assert!(backend.open(store.address()).await.is_err());
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `address` fail on open, load and query until marked available.
    pub fn mark_unavailable(&self, address: &StoreAddress) -> Result<(), BackendError> {
        self.inner
            .unavailable
            .write()
            .map_err(|_| BackendError::Poisoned)?
            .insert(address.clone());
        Ok(())
    }

    pub fn mark_available(&self, address: &StoreAddress) -> Result<(), BackendError> {
        self.inner
            .unavailable
            .write()
            .map_err(|_| BackendError::Poisoned)?
            .remove(address);
        Ok(())
    }

    /// Drop a store entirely, as if its files were lost.
    pub fn destroy(&self, address: &StoreAddress) -> Result<bool, BackendError> {
        let mut stores = self.inner.stores.write().map_err(|_| BackendError::Poisoned)?;
        Ok(stores.remove(address).is_some())
    }

    /// Number of stores that exist in the backend.
    pub fn store_count(&self) -> Result<usize, BackendError> {
        let stores = self.inner.stores.read().map_err(|_| BackendError::Poisoned)?;
        Ok(stores.len())
    }

    /// Handles currently open and not yet closed.
    pub fn open_store_count(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    /// Total successful `open` and `create` calls.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    fn handle(&self, address: StoreAddress, docs: SharedDocs) -> Box<dyn DocumentStore> {
        self.inner.open_handles.fetch_add(1, Ordering::SeqCst);
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryStore {
            address,
            docs,
            backend: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, address: &StoreAddress) -> Result<Box<dyn DocumentStore>, BackendError> {
        self.inner.check_available(address)?;
        let docs = {
            let stores = self.inner.stores.read().map_err(|_| BackendError::Poisoned)?;
            stores
                .get(address)
                .cloned()
                .ok_or_else(|| BackendError::Missing(address.clone()))?
        };
        Ok(self.handle(address.clone(), docs))
    }

    async fn create(&self, namespace: &str) -> Result<Box<dyn DocumentStore>, BackendError> {
        let address = new_address(namespace);
        let docs = SharedDocs::default();
        self.inner
            .stores
            .write()
            .map_err(|_| BackendError::Poisoned)?
            .insert(address.clone(), Arc::clone(&docs));
        Ok(self.handle(address, docs))
    }
}

struct MemoryStore {
    address: StoreAddress,
    docs: SharedDocs,
    backend: Arc<MemoryInner>,
    closed: AtomicBool,
}

impl MemoryStore {
    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed(self.address.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn address(&self) -> &StoreAddress {
        &self.address
    }

    async fn load(&self, depth: Option<usize>) -> Result<usize, BackendError> {
        self.ensure_open()?;
        self.backend.check_available(&self.address)?;
        let docs = self.docs.read().map_err(|_| BackendError::Poisoned)?;
        Ok(depth.map_or(docs.len(), |d| d.min(docs.len())))
    }

    async fn put(&self, document: StoredDocument) -> Result<DocumentRef, BackendError> {
        self.ensure_open()?;
        let reference = DocumentRef::new(document.key.clone());
        self.docs
            .write()
            .map_err(|_| BackendError::Poisoned)?
            .insert(document.key.clone(), document);
        Ok(reference)
    }

    async fn query(
        &self,
        predicate: &DocumentPredicate,
    ) -> Result<Vec<StoredDocument>, BackendError> {
        self.ensure_open()?;
        self.backend.check_available(&self.address)?;
        let docs = self.docs.read().map_err(|_| BackendError::Poisoned)?;
        Ok(docs
            .values()
            .filter(|doc| predicate.matches(doc))
            .cloned()
            .collect())
    }

    async fn delete(&self, reference: &DocumentRef) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.docs
            .write()
            .map_err(|_| BackendError::Poisoned)?
            .remove(reference.key());
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BackendError::Closed(self.address.clone()));
        }
        self.backend.open_handles.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
