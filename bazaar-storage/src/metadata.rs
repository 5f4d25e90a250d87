//! Metadata index: one JSON file per shop.
//!
//! `{dir}/{id}-metadata.json` holds the [`ShopMetadata`] projection. The
//! absence of the file is the canonical signal that a shop does not exist,
//! so enumeration never has to open a backing store.

use std::path::{Path, PathBuf};

use bazaar_core::{validate_shop_id, BazaarError, BazaarResult, ShopMetadata, StorageError};
use tokio::fs;
use tracing::debug;

const METADATA_SUFFIX: &str = "-metadata.json";

fn io_error(path: &Path, e: std::io::Error) -> BazaarError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}

/// Directory-backed index of shop metadata.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    dir: PathBuf,
}

impl MetadataIndex {
    /// Open the index at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> BazaarResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the metadata file for `shop_id`.
    pub fn path_for(&self, shop_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", shop_id, METADATA_SUFFIX))
    }

    /// Persist `meta`, replacing any previous entry.
    ///
    /// Writes to a temporary file first and renames it into place so a
    /// reader never observes a half-written entry.
    pub async fn save(&self, meta: &ShopMetadata) -> BazaarResult<()> {
        validate_shop_id(&meta.id)?;
        let path = self.path_for(&meta.id);
        let body = serde_json::to_vec_pretty(meta).map_err(BazaarError::serialization)?;

        let tmp = self.dir.join(format!(
            ".{}{}.{}.tmp",
            meta.id,
            METADATA_SUFFIX,
            uuid::Uuid::now_v7().simple()
        ));
        fs::write(&tmp, &body).await.map_err(|e| io_error(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(&path, e));
        }
        debug!(shop_id = %meta.id, path = %path.display(), "Saved shop metadata");
        Ok(())
    }

    /// Read the entry for `shop_id`; `Ok(None)` when no entry exists.
    pub async fn get(&self, shop_id: &str) -> BazaarResult<Option<ShopMetadata>> {
        validate_shop_id(shop_id)?;
        let path = self.path_for(shop_id);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let meta = serde_json::from_slice(&body).map_err(|e| {
            BazaarError::serialization(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(meta))
    }

    /// Remove the entry for `shop_id`. Returns whether an entry existed.
    pub async fn delete(&self, shop_id: &str) -> BazaarResult<bool> {
        validate_shop_id(shop_id)?;
        let path = self.path_for(shop_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// All known shop identifiers, sorted.
    pub async fn list_ids(&self) -> BazaarResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id) = name.strip_suffix(METADATA_SUFFIX) else {
                continue;
            };
            if validate_shop_id(id).is_ok() {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn contains(&self, shop_id: &str) -> BazaarResult<bool> {
        Ok(self.get(shop_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::StoreAddress;
    use tempfile::TempDir;

    async fn create_test_index() -> (MetadataIndex, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let index = MetadataIndex::open(temp_dir.path().join("metadata"))
            .await
            .expect("index should open");
        (index, temp_dir)
    }

    fn meta(id: &str, owner: &str) -> ShopMetadata {
        ShopMetadata {
            id: id.to_string(),
            name: format!("{} name", id),
            owner: owner.to_string(),
            storage_address: Some(StoreAddress::new(format!("{}-addr", id))),
        }
    }

    #[tokio::test]
    async fn test_save_get_overwrite() {
        let (index, _temp_dir) = create_test_index().await;
        index.save(&meta("alice-shop", "0xABC")).await.unwrap();
        assert!(index.path_for("alice-shop").ends_with("alice-shop-metadata.json"));

        let got = index.get("alice-shop").await.unwrap().unwrap();
        assert_eq!(got.owner, "0xABC");

        index.save(&meta("alice-shop", "0xDEF")).await.unwrap();
        let got = index.get("alice-shop").await.unwrap().unwrap();
        assert_eq!(got.owner, "0xDEF");
    }

    #[tokio::test]
    async fn test_file_uses_camel_case_fields() {
        let (index, _temp_dir) = create_test_index().await;
        index.save(&meta("alice-shop", "0xABC")).await.unwrap();
        let raw = std::fs::read_to_string(index.path_for("alice-shop")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["storageAddress"], "alice-shop-addr");
        assert_eq!(json["name"], "alice-shop name");
    }

    #[tokio::test]
    async fn test_get_missing_is_none_not_error() {
        let (index, _temp_dir) = create_test_index().await;
        assert_eq!(index.get("nobody").await.unwrap(), None);
        assert!(!index.contains("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_empty_id() {
        let (index, _temp_dir) = create_test_index().await;
        let err = index.save(&meta("", "0xABC")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_error() {
        let (index, _temp_dir) = create_test_index().await;
        index.save(&meta("a", "o")).await.unwrap();
        assert!(index.delete("a").await.unwrap());
        assert!(!index.delete("a").await.unwrap());
        assert_eq!(index.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_ids_sorted_and_ignores_other_files() {
        let (index, _temp_dir) = create_test_index().await;
        for id in ["c", "a", "b"] {
            index.save(&meta(id, "o")).await.unwrap();
        }
        std::fs::write(index.dir().join("notes.txt"), b"x").unwrap();
        std::fs::write(index.dir().join(".hidden-metadata.json"), b"{}").unwrap();

        assert_eq!(index.list_ids().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let (index, _temp_dir) = create_test_index().await;
        std::fs::write(index.path_for("broken"), b"{not json").unwrap();
        let err = index.get("broken").await.unwrap_err();
        assert!(matches!(
            err,
            BazaarError::Storage(StorageError::Serialization { .. })
        ));
    }
}
