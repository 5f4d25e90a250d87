//! Bazaar Core - Shop Types
//!
//! Pure data structures shared by the storage layer and its callers:
//! the shop record and its index projection, listing queries, the error
//! taxonomy, and configuration.

mod config;
mod entities;
mod error;
mod filter;
mod identity;

pub use config::{BazaarConfig, CONFIG_PATH_ENV, MAX_LMDB_MAP_SIZE_MB};
pub use entities::{
    AssetRef, ContactInfo, LineItem, ShopAssets, ShopContent, ShopExport, ShopMetadata,
    ShopRecord, StoreAddress, ThemeColors, EXPORT_FORMAT_VERSION,
};
pub use error::{
    BazaarError, BazaarResult, ConfigError, ShopFailure, StorageError, ValidationError,
};
pub use filter::{ShopQuery, SortField};
pub use identity::{
    shop_id_from_owner, slugify, validate_shop_id, Timestamp, MAX_SHOP_ID_LEN,
};
