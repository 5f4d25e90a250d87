//! Error types for bazaar operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Shop not found: {shop_id}")]
    NotFound { shop_id: String },

    #[error("Shop already exists: {shop_id}")]
    AlreadyExists { shop_id: String },

    #[error("No open store handle for shop {shop_id}")]
    NotOpen { shop_id: String },

    #[error("Store for shop {shop_id} unavailable at {address}: {reason}")]
    StoreUnavailable {
        shop_id: String,
        address: String,
        reason: String,
    },

    #[error("Backend operation {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// One failed unit inside a bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopFailure {
    pub shop_id: String,
    pub error: BazaarError,
}

impl std::fmt::Display for ShopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.shop_id, self.error)
    }
}

/// Master error type for all bazaar errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BazaarError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{operation} failed for all {} shops{}", .failures.len(), summarize(.failures))]
    Aggregate {
        operation: String,
        failures: Vec<ShopFailure>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

fn summarize(failures: &[ShopFailure]) -> String {
    match failures.first() {
        Some(first) if failures.len() == 1 => format!(" ({first})"),
        Some(first) => format!(" (first: {first})"),
        None => String::new(),
    }
}

impl BazaarError {
    /// Shorthand for a missing shop.
    pub fn not_found(shop_id: impl Into<String>) -> Self {
        StorageError::NotFound {
            shop_id: shop_id.into(),
        }
        .into()
    }

    /// Shorthand for a failing backend call.
    pub fn backend(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
        .into()
    }

    /// Shorthand for serialization failures.
    pub fn serialization(reason: impl std::fmt::Display) -> Self {
        StorageError::Serialization {
            reason: reason.to_string(),
        }
        .into()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }

    pub fn is_not_open(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotOpen { .. }))
    }

    /// True when the backing store could not be opened or loaded and
    /// the shop is a candidate for repair.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::StoreUnavailable { .. }))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for bazaar operations.
pub type BazaarResult<T> = Result<T, BazaarError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            shop_id: "alice-shop".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Shop not found"));
        assert!(msg.contains("alice-shop"));
    }

    #[test]
    fn test_store_unavailable_display_names_address() {
        let err = StorageError::StoreUnavailable {
            shop_id: "s".to_string(),
            address: "shop-0191".to_string(),
            reason: "missing directory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("shop-0191"));
        assert!(msg.contains("missing directory"));
    }

    #[test]
    fn test_validation_error_converts_to_master() {
        let err: BazaarError = ValidationError::RequiredFieldMissing {
            field: "owner".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn test_predicates() {
        assert!(BazaarError::not_found("x").is_not_found());
        let not_open: BazaarError = StorageError::NotOpen {
            shop_id: "x".to_string(),
        }
        .into();
        assert!(not_open.is_not_open());
        let unavailable: BazaarError = StorageError::StoreUnavailable {
            shop_id: "x".to_string(),
            address: "a".to_string(),
            reason: "r".to_string(),
        }
        .into();
        assert!(unavailable.is_store_unavailable());
        assert!(!unavailable.is_not_open());
    }

    #[test]
    fn test_aggregate_display() {
        let err = BazaarError::Aggregate {
            operation: "list_shops".to_string(),
            failures: vec![
                ShopFailure {
                    shop_id: "a".to_string(),
                    error: BazaarError::not_found("a"),
                },
                ShopFailure {
                    shop_id: "b".to_string(),
                    error: BazaarError::not_found("b"),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("list_shops failed for all 2 shops"));
        assert!(msg.contains("first: a"));
    }
}
