//! Bazaar Storage - Per-shop stores, metadata index and read cache
//!
//! Every shop is backed by its own document store. This crate manages:
//! - the metadata index, a cheap one-file-per-shop projection used for
//!   lookups and enumeration
//! - the store registry, which opens, creates, closes and repairs handles
//! - the shop cache, bounded by capacity and TTL
//! - the [`ShopManager`] façade tying them together, including bulk listing
//!   under bounded concurrency

pub mod backend;
pub mod cache;
pub mod document;
pub mod manager;
pub mod metadata;
pub mod registry;

pub use backend::{
    BackendError, DocumentBackend, DocumentPredicate, DocumentRef, DocumentStore, LmdbBackend,
    MemoryBackend, StoredDocument,
};
pub use cache::{CacheConfig, CacheStats, ShopCache};
pub use document::{decode_shop, encode_shop, shop_key, SHOP_SCHEMA_VERSION, SHOP_TAG};
pub use manager::{ManagerStats, ShopManager};
pub use metadata::MetadataIndex;
pub use registry::{ReconnectReport, RepairOutcome, StoreHandle, StoreRegistry};

pub use tokio_util::sync::CancellationToken;
