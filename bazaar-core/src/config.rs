//! Configuration loading
//!
//! Values come from defaults, then an optional TOML file, then `BAZAAR_*`
//! environment variables.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file.
pub const CONFIG_PATH_ENV: &str = "BAZAAR_CONFIG";

/// Largest accepted LMDB map size (1 TiB).
pub const MAX_LMDB_MAP_SIZE_MB: usize = 1 << 20;

/// Storage layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BazaarConfig {
    /// Root directory for metadata files and shop stores.
    pub data_dir: PathBuf,
    /// Maximum number of shops held in the read cache.
    pub cache_capacity: usize,
    /// Time-to-live of a cache entry, in seconds.
    pub cache_ttl_secs: u64,
    /// Worker count for bulk listing.
    pub list_concurrency: usize,
    /// How many persisted documents to materialise when loading a store.
    /// `None` loads everything.
    pub load_depth: Option<usize>,
    /// LMDB map size per shop store, in megabytes.
    pub lmdb_map_size_mb: usize,
}

impl Default for BazaarConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./bazaar-data"),
            cache_capacity: 100,
            cache_ttl_secs: 300,
            list_concurrency: 5,
            load_depth: None,
            lmdb_map_size_mb: 64,
        }
    }
}

impl BazaarConfig {
    /// Load configuration: file (explicit path or `BAZAAR_CONFIG`), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
        let base = match path {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    ///
    /// Environment variables:
    /// - `BAZAAR_DATA_DIR`: data directory (default: ./bazaar-data)
    /// - `BAZAAR_CACHE_CAPACITY`: cache entries (default: 100)
    /// - `BAZAAR_CACHE_TTL_SECS`: cache TTL (default: 300)
    /// - `BAZAAR_LIST_CONCURRENCY`: listing workers (default: 5)
    /// - `BAZAAR_LOAD_DEPTH`: documents loaded per store (default: all)
    /// - `BAZAAR_LMDB_MAP_SIZE_MB`: LMDB map size (default: 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(dir) = std::env::var("BAZAAR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_env("BAZAAR_CACHE_CAPACITY")? {
            self.cache_capacity = v;
        }
        if let Some(v) = parse_env("BAZAAR_CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = parse_env("BAZAAR_LIST_CONCURRENCY")? {
            self.list_concurrency = v;
        }
        if let Some(v) = parse_env("BAZAAR_LOAD_DEPTH")? {
            self.load_depth = Some(v);
        }
        if let Some(v) = parse_env("BAZAAR_LMDB_MAP_SIZE_MB")? {
            self.lmdb_map_size_mb = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(invalid("data_dir", "", "must not be empty"));
        }
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "0", "must be > 0"));
        }
        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "0", "must be > 0"));
        }
        if self.list_concurrency == 0 {
            return Err(invalid("list_concurrency", "0", "must be > 0"));
        }
        if self.lmdb_map_size_mb == 0 {
            return Err(invalid("lmdb_map_size_mb", "0", "must be > 0"));
        }
        if self.lmdb_map_size_mb > MAX_LMDB_MAP_SIZE_MB {
            return Err(invalid(
                "lmdb_map_size_mb",
                &self.lmdb_map_size_mb.to_string(),
                &format!("must be at most {}", MAX_LMDB_MAP_SIZE_MB),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }

    pub fn stores_dir(&self) -> PathBuf {
        self.data_dir.join("stores")
    }

    /// Point the configuration at another data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, &raw, "not a valid number")),
        Err(_) => Ok(None),
    }
}
