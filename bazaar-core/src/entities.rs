//! Core entity structures

use crate::{validate_shop_id, Timestamp, ValidationError};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Address of a shop's backing document store.
///
/// Opaque to everything but the backend that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreAddress(String);

impl StoreAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to binary content held in the external content-addressed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Content identifier in the asset store.
    pub cid: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// A single item offered by a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: String,
    pub title: String,
    pub description: Option<String>,
    /// Price in the smallest currency unit.
    pub price_minor: i64,
    pub currency: String,
    pub quantity: u32,
    pub image: Option<AssetRef>,
}

/// Theme colors as CSS color strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub text: String,
}

impl Default for ThemeColors {
    fn default() -> Self {
        Self {
            primary: "#1f2937".to_string(),
            secondary: "#f59e0b".to_string(),
            background: "#ffffff".to_string(),
            text: "#111827".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
}

/// Content block of a shop: ordered items, theme and contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopContent {
    pub items: Vec<LineItem>,
    pub theme: ThemeColors,
    pub contact: ContactInfo,
}

/// References to externally stored binary content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopAssets {
    pub logo: Option<AssetRef>,
    pub banner: Option<AssetRef>,
    pub gallery: Vec<AssetRef>,
    /// Generated static site bundle, if one was published.
    pub site_bundle: Option<AssetRef>,
}

/// Shop - the full persisted entity.
/// Each shop lives in its own backing document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRecord {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub content: ShopContent,
    pub assets: ShopAssets,
    /// Address of the backing store; filled in by the storage layer.
    pub storage_address: Option<StoreAddress>,
}

impl ShopRecord {
    /// Create a new shop record with empty content.
    pub fn new(id: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
            content: ShopContent::default(),
            assets: ShopAssets::default(),
            storage_address: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a line item.
    pub fn with_item(mut self, item: LineItem) -> Self {
        self.content.items.push(item);
        self
    }

    /// Check the fields required before any persistence call.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_shop_id(&self.id)?;
        if self.owner.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "owner".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            });
        }
        for item in &self.content.items {
            if item.item_id.trim().is_empty() {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "content.items.item_id".to_string(),
                });
            }
            if item.price_minor < 0 {
                return Err(ValidationError::InvalidValue {
                    field: format!("content.items[{}].price_minor", item.item_id),
                    reason: "must not be negative".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Project the record onto its lightweight index entry.
    pub fn metadata(&self) -> ShopMetadata {
        ShopMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            storage_address: self.storage_address.clone(),
        }
    }
}

/// Lightweight index entry for a shop, stored apart from the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopMetadata {
    pub id: String,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub storage_address: Option<StoreAddress>,
}

impl ShopMetadata {
    /// Placeholder entry written when a store is allocated before the
    /// record itself is saved.
    pub fn unnamed(id: impl Into<String>, address: StoreAddress) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            owner: String::new(),
            storage_address: Some(address),
        }
    }
}

/// Current version of the export bundle format.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// Portable bundle of a shop and its index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopExport {
    pub format_version: u32,
    pub exported_at: Timestamp,
    pub metadata: ShopMetadata,
    pub shop: ShopRecord,
}

impl ShopExport {
    pub fn new(metadata: ShopMetadata, shop: ShopRecord) -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: Utc::now(),
            metadata,
            shop,
        }
    }

    /// Check the bundle is importable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.format_version != EXPORT_FORMAT_VERSION {
            return Err(ValidationError::InvalidValue {
                field: "format_version".to_string(),
                reason: format!(
                    "unsupported version {} (expected {})",
                    self.format_version, EXPORT_FORMAT_VERSION
                ),
            });
        }
        if self.metadata.id != self.shop.id {
            return Err(ValidationError::InvalidValue {
                field: "metadata.id".to_string(),
                reason: format!("'{}' does not match shop id '{}'", self.metadata.id, self.shop.id),
            });
        }
        self.shop.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, price: i64) -> LineItem {
        LineItem {
            item_id: id.to_string(),
            title: "Jar of honey".to_string(),
            description: None,
            price_minor: price,
            currency: "USD".to_string(),
            quantity: 3,
            image: None,
        }
    }

    #[test]
    fn test_validate_requires_owner_and_name() {
        let shop = ShopRecord::new("alice-shop", "", "Alice's Goods");
        assert_eq!(
            shop.validate(),
            Err(ValidationError::RequiredFieldMissing {
                field: "owner".to_string()
            })
        );

        let shop = ShopRecord::new("alice-shop", "0xABC", "  ");
        assert_eq!(
            shop.validate(),
            Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string()
            })
        );

        let shop = ShopRecord::new("", "0xABC", "Alice's Goods");
        assert!(shop.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_price() {
        let shop = ShopRecord::new("alice-shop", "0xABC", "Alice's Goods").with_item(item("i1", -1));
        assert!(matches!(
            shop.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));

        let shop = ShopRecord::new("alice-shop", "0xABC", "Alice's Goods").with_item(item("i1", 450));
        assert!(shop.validate().is_ok());
    }

    #[test]
    fn test_metadata_projection() {
        let mut shop = ShopRecord::new("alice-shop", "0xABC", "Alice's Goods");
        shop.storage_address = Some(StoreAddress::new("shop-01"));
        let meta = shop.metadata();
        assert_eq!(meta.id, "alice-shop");
        assert_eq!(meta.owner, "0xABC");
        assert_eq!(meta.storage_address, Some(StoreAddress::new("shop-01")));
    }

    #[test]
    fn test_metadata_json_field_names() {
        let meta = ShopMetadata {
            id: "alice-shop".to_string(),
            name: "Alice's Goods".to_string(),
            owner: "0xABC".to_string(),
            storage_address: Some(StoreAddress::new("shop-01")),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["storageAddress"], "shop-01");
        assert_eq!(json["id"], "alice-shop");
    }

    #[test]
    fn test_export_validate_checks_ids_and_version() {
        let shop = ShopRecord::new("alice-shop", "0xABC", "Alice's Goods");
        let mut export = ShopExport::new(shop.metadata(), shop);
        assert!(export.validate().is_ok());

        export.metadata.id = "other".to_string();
        assert!(export.validate().is_err());

        export.metadata.id = "alice-shop".to_string();
        export.format_version = 99;
        assert!(export.validate().is_err());
    }
}
