//! Document-store backend abstraction.
//!
//! Every shop lives in its own document store. The storage layer only needs
//! a small local CRUD surface from the engine behind it:
//!
//! - [`DocumentBackend::open`] / [`DocumentBackend::create`] hand out store handles
//! - [`DocumentStore`] loads persisted history and puts, queries and deletes documents
//!
//! Two engines ship with the crate: [`LmdbBackend`] (one LMDB environment per
//! shop, via heed) and [`MemoryBackend`] (process-local, with fault injection
//! for tests).

pub mod lmdb;
pub mod memory;

pub use lmdb::LmdbBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use bazaar_core::{BazaarError, StorageError, StoreAddress, Timestamp};
use serde::{Deserialize, Serialize};

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No store exists at the address.
    #[error("No store at {0}")]
    Missing(StoreAddress),

    /// The store exists but cannot be opened or read back.
    #[error("Store {address} is corrupted: {reason}")]
    Corrupted {
        address: StoreAddress,
        reason: String,
    },

    /// The handle was already closed.
    #[error("Store {0} is closed")]
    Closed(StoreAddress),

    /// Requested map size does not fit in memory addresses.
    #[error("LMDB map size of {0} MB is too large")]
    MapSizeTooLarge(usize),

    /// LMDB environment or transaction error.
    #[error("LMDB error: {0}")]
    Lmdb(String),

    /// Internal lock poisoned.
    #[error("Backend lock poisoned")]
    Poisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for BackendError {
    fn from(e: heed::Error) -> Self {
        BackendError::Lmdb(e.to_string())
    }
}

/// Convert BackendError to BazaarError.
impl From<BackendError> for BazaarError {
    fn from(e: BackendError) -> Self {
        BazaarError::Storage(StorageError::Backend {
            operation: "document store".to_string(),
            reason: e.to_string(),
        })
    }
}

/// A document as persisted by a backend.
///
/// The payload is opaque to the backend; see [`crate::document`] for the
/// typed shop encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Unique key within the store.
    pub key: String,
    /// Kind of document, used for tag queries.
    pub tag: String,
    pub payload: Vec<u8>,
    pub written_at: Timestamp,
}

/// Reference to a persisted document, returned by `put`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

/// Selection criteria for `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPredicate {
    All,
    Tag(String),
    Key(String),
}

impl DocumentPredicate {
    pub fn matches(&self, doc: &StoredDocument) -> bool {
        match self {
            Self::All => true,
            Self::Tag(tag) => doc.tag == *tag,
            Self::Key(key) => doc.key == *key,
        }
    }
}

/// An open handle to one shop's document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Address this store can be reopened at.
    fn address(&self) -> &StoreAddress;

    /// Materialise persisted history into memory.
    ///
    /// `depth` bounds the number of documents read; `None` reads all.
    /// Returns the number of documents loaded.
    async fn load(&self, depth: Option<usize>) -> Result<usize, BackendError>;

    /// Insert or replace a document by key.
    async fn put(&self, document: StoredDocument) -> Result<DocumentRef, BackendError>;

    async fn query(
        &self,
        predicate: &DocumentPredicate,
    ) -> Result<Vec<StoredDocument>, BackendError>;

    /// Delete a document. Deleting a missing key is not an error.
    async fn delete(&self, reference: &DocumentRef) -> Result<(), BackendError>;

    /// Release the store. Further calls fail with [`BackendError::Closed`].
    async fn close(&self) -> Result<(), BackendError>;
}

/// Factory for shop document stores.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Open an existing store.
    async fn open(&self, address: &StoreAddress) -> Result<Box<dyn DocumentStore>, BackendError>;

    /// Allocate a fresh store; its address is available via `address()`.
    async fn create(&self, namespace: &str) -> Result<Box<dyn DocumentStore>, BackendError>;
}

/// Build a new store address under a namespace.
pub(crate) fn new_address(namespace: &str) -> StoreAddress {
    StoreAddress::new(format!("{}-{}", namespace, uuid::Uuid::now_v7().simple()))
}
