//! Marshalling between [`ShopRecord`] and backend documents.
//!
//! This is the only place that knows how a shop is laid out inside its
//! store. The root record is a single document tagged [`SHOP_TAG`] under
//! the key `shop:{id}`, with a schema-versioned JSON payload.

use bazaar_core::{
    BazaarError, BazaarResult, ShopAssets, ShopContent, ShopRecord, StoreAddress, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::backend::StoredDocument;

/// Tag of the root shop document.
pub const SHOP_TAG: &str = "shop";

/// Schema version written into every shop payload.
pub const SHOP_SCHEMA_VERSION: u32 = 1;

/// Key of the root shop document for `shop_id`.
pub fn shop_key(shop_id: &str) -> String {
    format!("{}:{}", SHOP_TAG, shop_id)
}

/// Persisted form of a shop. The storage address is not stored; it is
/// known from the handle the document was read through.
#[derive(Debug, Serialize, Deserialize)]
struct ShopDocument {
    schema_version: u32,
    id: String,
    owner: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    #[serde(default)]
    content: ShopContent,
    #[serde(default)]
    assets: ShopAssets,
}

impl From<&ShopRecord> for ShopDocument {
    fn from(record: &ShopRecord) -> Self {
        Self {
            schema_version: SHOP_SCHEMA_VERSION,
            id: record.id.clone(),
            owner: record.owner.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            content: record.content.clone(),
            assets: record.assets.clone(),
        }
    }
}

impl ShopDocument {
    fn into_record(self, address: &StoreAddress) -> ShopRecord {
        ShopRecord {
            id: self.id,
            owner: self.owner,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
            content: self.content,
            assets: self.assets,
            storage_address: Some(address.clone()),
        }
    }
}

/// Encode a shop as its root document.
pub fn encode_shop(record: &ShopRecord) -> BazaarResult<StoredDocument> {
    let payload =
        serde_json::to_vec(&ShopDocument::from(record)).map_err(BazaarError::serialization)?;
    Ok(StoredDocument {
        key: shop_key(&record.id),
        tag: SHOP_TAG.to_string(),
        payload,
        written_at: Utc::now(),
    })
}

/// Decode a root document read from the store at `address`.
pub fn decode_shop(document: &StoredDocument, address: &StoreAddress) -> BazaarResult<ShopRecord> {
    if document.tag != SHOP_TAG {
        return Err(BazaarError::serialization(format!(
            "document {} has tag '{}', expected '{}'",
            document.key, document.tag, SHOP_TAG
        )));
    }
    let dto: ShopDocument =
        serde_json::from_slice(&document.payload).map_err(BazaarError::serialization)?;
    if dto.schema_version != SHOP_SCHEMA_VERSION {
        return Err(BazaarError::serialization(format!(
            "unsupported shop schema version {} in {}",
            dto.schema_version, document.key
        )));
    }
    Ok(dto.into_record(address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{LineItem, StorageError};

    fn sample() -> ShopRecord {
        ShopRecord::new("alice-shop", "0xABC", "Alice's Goods")
            .with_description("Honey and beeswax")
            .with_item(LineItem {
                item_id: "jar".to_string(),
                title: "Jar of honey".to_string(),
                description: None,
                price_minor: 900,
                currency: "USD".to_string(),
                quantity: 12,
                image: None,
            })
    }

    #[test]
    fn test_encode_uses_root_key_and_tag() {
        let doc = encode_shop(&sample()).unwrap();
        assert_eq!(doc.key, "shop:alice-shop");
        assert_eq!(doc.tag, SHOP_TAG);

        let json: serde_json::Value = serde_json::from_slice(&doc.payload).unwrap();
        assert_eq!(json["schema_version"], SHOP_SCHEMA_VERSION);
        assert!(json.get("storage_address").is_none());
    }

    #[test]
    fn test_decode_fills_address_from_handle() {
        let record = sample();
        let doc = encode_shop(&record).unwrap();
        let address = StoreAddress::new("alice-shop-0191");
        let decoded = decode_shop(&doc, &address).unwrap();

        assert_eq!(decoded.storage_address, Some(address));
        assert_eq!(decoded.content, record.content);
        assert_eq!(decoded.created_at, record.created_at);
        assert_eq!(decoded.description.as_deref(), Some("Honey and beeswax"));
    }

    #[test]
    fn test_decode_rejects_unknown_schema_version() {
        let mut doc = encode_shop(&sample()).unwrap();
        let mut json: serde_json::Value = serde_json::from_slice(&doc.payload).unwrap();
        json["schema_version"] = serde_json::json!(99);
        doc.payload = serde_json::to_vec(&json).unwrap();

        let err = decode_shop(&doc, &StoreAddress::new("a")).unwrap_err();
        assert!(matches!(
            err,
            BazaarError::Storage(StorageError::Serialization { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage_and_wrong_tag() {
        let mut doc = encode_shop(&sample()).unwrap();
        doc.tag = "order".to_string();
        assert!(decode_shop(&doc, &StoreAddress::new("a")).is_err());

        doc.tag = SHOP_TAG.to_string();
        doc.payload = b"not json".to_vec();
        assert!(decode_shop(&doc, &StoreAddress::new("a")).is_err());
    }
}
