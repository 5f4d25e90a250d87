//! LMDB-backed document stores, one environment per shop.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each store lives in
//! `{root}/{address}/` and holds a single named database, `documents`,
//! keyed by document key.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. A store uses:
//! - Read transactions for `load` and `query`
//! - Write transactions for `put` and `delete`
//!
//! `close` waits for the environment to be fully released so the same
//! address can be reopened later in the process.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use bazaar_core::StoreAddress;
use heed::types::{SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::{
    new_address, BackendError, DocumentBackend, DocumentPredicate, DocumentRef, DocumentStore,
    StoredDocument,
};

const DOCUMENTS_DB: &str = "documents";

type DocumentsDb = Database<Str, SerdeBincode<StoredDocument>>;

/// Factory for LMDB shop stores rooted at one directory.
///
/// # Example
///
/// ```ignore
/// let backend = LmdbBackend::new("/var/lib/bazaar/stores", 64)?;
/// let store = backend.create("alice-shop").await?;
/// store.put(document).await?;
/// ```
#[derive(Debug, Clone)]
pub struct LmdbBackend {
    root: PathBuf,
    /// Map size in bytes.
    map_size: usize,
}

impl LmdbBackend {
    /// Create a backend storing environments under `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding one sub-directory per store
    /// * `map_size_mb` - Maximum size of each store in megabytes
    pub fn new<P: AsRef<Path>>(root: P, map_size_mb: usize) -> Result<Self, BackendError> {
        let map_size = map_size_mb
            .checked_mul(1024 * 1024)
            .ok_or(BackendError::MapSizeTooLarge(map_size_mb))?;
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            map_size,
        })
    }

    /// Directory of the store at `address`.
    pub fn store_dir(&self, address: &StoreAddress) -> PathBuf {
        self.root.join(address.as_str())
    }

    fn open_env(&self, dir: &Path) -> Result<Env, BackendError> {
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(self.map_size)
                .max_dbs(1)
                .open(dir)
        }?;
        Ok(env)
    }
}

fn is_plain_component(address: &StoreAddress) -> bool {
    let raw = address.as_str();
    !raw.is_empty() && !raw.starts_with('.') && !raw.contains(['/', '\\'])
}

#[async_trait]
impl DocumentBackend for LmdbBackend {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn open(&self, address: &StoreAddress) -> Result<Box<dyn DocumentStore>, BackendError> {
        if !is_plain_component(address) {
            return Err(BackendError::Corrupted {
                address: address.clone(),
                reason: "address is not a plain path component".to_string(),
            });
        }
        let dir = self.store_dir(address);
        if !dir.is_dir() {
            return Err(BackendError::Missing(address.clone()));
        }

        let corrupted = |reason: String| BackendError::Corrupted {
            address: address.clone(),
            reason,
        };
        let env = self.open_env(&dir).map_err(|e| corrupted(e.to_string()))?;

        let wtxn = env.write_txn()?;
        let docs: Option<DocumentsDb> = env
            .open_database(&wtxn, Some(DOCUMENTS_DB))
            .map_err(|e| corrupted(e.to_string()))?;
        wtxn.commit()?;
        let docs = docs.ok_or_else(|| corrupted("documents table missing".to_string()))?;

        Ok(Box::new(LmdbStore::new(address.clone(), env, docs)))
    }

    async fn create(&self, namespace: &str) -> Result<Box<dyn DocumentStore>, BackendError> {
        let address = new_address(namespace);
        let dir = self.store_dir(&address);
        std::fs::create_dir_all(&dir)?;

        let env = self.open_env(&dir)?;
        let mut wtxn = env.write_txn()?;
        let docs: DocumentsDb = env.create_database(&mut wtxn, Some(DOCUMENTS_DB))?;
        wtxn.commit()?;

        Ok(Box::new(LmdbStore::new(address, env, docs)))
    }
}

#[derive(Clone)]
struct LiveEnv {
    env: Env,
    docs: DocumentsDb,
}

/// One open LMDB shop store.
pub struct LmdbStore {
    address: StoreAddress,
    live: RwLock<Option<LiveEnv>>,
}

impl LmdbStore {
    fn new(address: StoreAddress, env: Env, docs: DocumentsDb) -> Self {
        Self {
            address,
            live: RwLock::new(Some(LiveEnv { env, docs })),
        }
    }

    fn live(&self) -> Result<LiveEnv, BackendError> {
        let guard = self.live.read().map_err(|_| BackendError::Poisoned)?;
        guard
            .clone()
            .ok_or_else(|| BackendError::Closed(self.address.clone()))
    }
}

/// Run an LMDB transaction off the async workers.
async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::Lmdb(format!("{} task failed: {}", operation, e)))?
}

#[async_trait]
impl DocumentStore for LmdbStore {
    fn address(&self) -> &StoreAddress {
        &self.address
    }

    async fn load(&self, depth: Option<usize>) -> Result<usize, BackendError> {
        let LiveEnv { env, docs } = self.live()?;
        let address = self.address.clone();

        blocking("load", move || {
            let rtxn = env.read_txn()?;
            let mut loaded = 0;
            for entry in docs.iter(&rtxn)?.take(depth.unwrap_or(usize::MAX)) {
                entry.map_err(|e| BackendError::Corrupted {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;
                loaded += 1;
            }
            Ok(loaded)
        })
        .await
    }

    async fn put(&self, document: StoredDocument) -> Result<DocumentRef, BackendError> {
        let LiveEnv { env, docs } = self.live()?;
        blocking("put", move || {
            let mut wtxn = env.write_txn()?;
            docs.put(&mut wtxn, document.key.as_str(), &document)?;
            wtxn.commit()?;
            Ok(DocumentRef::new(document.key))
        })
        .await
    }

    async fn query(
        &self,
        predicate: &DocumentPredicate,
    ) -> Result<Vec<StoredDocument>, BackendError> {
        let LiveEnv { env, docs } = self.live()?;
        let predicate = predicate.clone();
        blocking("query", move || {
            let rtxn = env.read_txn()?;
            if let DocumentPredicate::Key(key) = &predicate {
                return Ok(docs.get(&rtxn, key.as_str())?.into_iter().collect());
            }

            let mut matches = Vec::new();
            for entry in docs.iter(&rtxn)? {
                let (_, doc) = entry?;
                if predicate.matches(&doc) {
                    matches.push(doc);
                }
            }
            Ok(matches)
        })
        .await
    }

    async fn delete(&self, reference: &DocumentRef) -> Result<(), BackendError> {
        let LiveEnv { env, docs } = self.live()?;
        let key = reference.key().to_string();
        blocking("delete", move || {
            let mut wtxn = env.write_txn()?;
            docs.delete(&mut wtxn, key.as_str())?;
            wtxn.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), BackendError> {
        let live = {
            let mut guard = self.live.write().map_err(|_| BackendError::Poisoned)?;
            guard.take()
        }
        .ok_or_else(|| BackendError::Closed(self.address.clone()))?;

        let LiveEnv { env, .. } = live;
        tokio::task::spawn_blocking(move || env.prepare_for_closing().wait())
            .await
            .map_err(|e| BackendError::Lmdb(format!("close task failed: {}", e)))?;
        Ok(())
    }
}
