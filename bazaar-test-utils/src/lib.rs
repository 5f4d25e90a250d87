//! Bazaar Test Utilities
//!
//! Shared test infrastructure for the bazaar workspace:
//! - Proptest generators for shops and their parts
//! - Fixtures for common scenarios
//! - Assertions on bazaar error variants

pub use bazaar_core::{
    AssetRef, BazaarError, BazaarResult, ContactInfo, LineItem, ShopAssets, ShopContent,
    ShopMetadata, ShopRecord, StorageError, StoreAddress, ThemeColors, Timestamp,
};

pub use fixtures::{alice_shop, line_item, shop_fixture};
pub use generators::{arb_shop, arb_shop_id};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating bazaar entity types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid shop identifier.
    pub fn arb_shop_id() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9_-]{0,30}"
    }

    /// Generate a wallet-style owner address.
    pub fn arb_owner() -> impl Strategy<Value = String> {
        "0x[0-9A-F]{6,40}"
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // Generate timestamps within a reasonable range (2020-2030)
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_asset_ref() -> impl Strategy<Value = AssetRef> {
        ("bafy[a-z2-7]{20,40}", "image/(png|jpeg|webp)", 1u64..5_000_000).prop_map(
            |(cid, mime_type, size_bytes)| AssetRef {
                cid,
                mime_type,
                size_bytes,
            },
        )
    }

    pub fn arb_line_item() -> impl Strategy<Value = LineItem> {
        (
            "[a-z0-9]{1,12}",
            "[A-Za-z ]{1,40}",
            prop::option::of("[A-Za-z ,.]{0,80}"),
            0i64..1_000_000,
            prop_oneof![Just("USD"), Just("EUR"), Just("ETH")],
            0u32..1000,
            prop::option::of(arb_asset_ref()),
        )
            .prop_map(
                |(item_id, title, description, price_minor, currency, quantity, image)| LineItem {
                    item_id,
                    title,
                    description,
                    price_minor,
                    currency: currency.to_string(),
                    quantity,
                    image,
                },
            )
    }

    pub fn arb_contact() -> impl Strategy<Value = ContactInfo> {
        (
            prop::option::of("[a-z]{1,10}@[a-z]{1,10}\\.com"),
            prop::option::of("\\+[0-9]{8,12}"),
        )
            .prop_map(|(email, phone)| ContactInfo {
                email,
                phone,
                website: None,
                address: None,
            })
    }

    /// Generate a shop that passes validation.
    pub fn arb_shop() -> impl Strategy<Value = ShopRecord> {
        (
            arb_shop_id(),
            arb_owner(),
            "[A-Za-z' ]{0,30}[A-Za-z]",
            prop::option::of("[A-Za-z ]{1,100}"),
            arb_timestamp(),
            prop::collection::vec(arb_line_item(), 0..5),
            arb_contact(),
            prop::option::of(arb_asset_ref()),
        )
            .prop_map(
                |(id, owner, name, description, created_at, items, contact, logo)| ShopRecord {
                    id,
                    owner,
                    name,
                    description,
                    created_at,
                    updated_at: created_at,
                    content: ShopContent {
                        items,
                        theme: ThemeColors::default(),
                        contact,
                    },
                    assets: ShopAssets {
                        logo,
                        ..ShopAssets::default()
                    },
                    storage_address: None,
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A shop with the given identity and no content.
    pub fn shop_fixture(id: &str, owner: &str, name: &str) -> ShopRecord {
        ShopRecord::new(id, owner, name)
    }

    /// A priced line item.
    pub fn line_item(item_id: &str, title: &str, price_minor: i64) -> LineItem {
        LineItem {
            item_id: item_id.to_string(),
            title: title.to_string(),
            description: None,
            price_minor,
            currency: "USD".to_string(),
            quantity: 1,
            image: None,
        }
    }

    /// `alice-shop`, owned by `0xABC`, named `Alice's Goods`, with two items.
    pub fn alice_shop() -> ShopRecord {
        let mut shop = ShopRecord::new("alice-shop", "0xABC", "Alice's Goods")
            .with_description("Small-batch honey and beeswax candles")
            .with_item(line_item("honey-jar", "Jar of wildflower honey", 900))
            .with_item(line_item("candle", "Beeswax candle", 1450));
        shop.content.contact.email = Some("alice@example.com".to_string());
        shop
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on bazaar error variants.

    use super::*;

    /// Assert that a BazaarResult is a NotFound storage error for `shop_id`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &BazaarResult<T>, shop_id: &str) {
        match result {
            Err(BazaarError::Storage(StorageError::NotFound { shop_id: id })) => {
                assert_eq!(id, shop_id, "Wrong shop id in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", shop_id, other),
        }
    }

    /// Assert that a BazaarResult is a NotOpen storage error.
    #[track_caller]
    pub fn assert_not_open<T: std::fmt::Debug>(result: &BazaarResult<T>) {
        match result {
            Err(BazaarError::Storage(StorageError::NotOpen { .. })) => {}
            other => panic!("Expected NotOpen error, got: {:?}", other),
        }
    }

    /// Assert that a BazaarResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &BazaarResult<T>) {
        match result {
            Err(BazaarError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a BazaarResult is an Aggregate error with `count` failures.
    #[track_caller]
    pub fn assert_aggregate<T: std::fmt::Debug>(result: &BazaarResult<T>, count: usize) {
        match result {
            Err(BazaarError::Aggregate { failures, .. }) => {
                assert_eq!(failures.len(), count, "Wrong number of failures");
            }
            other => panic!("Expected Aggregate error, got: {:?}", other),
        }
    }
}
