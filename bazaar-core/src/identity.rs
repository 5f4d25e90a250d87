//! Identity rules for shops
//!
//! Shop identifiers double as file names in the metadata index, so they are
//! restricted to a portable character set.

use crate::ValidationError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Maximum length of a shop identifier.
pub const MAX_SHOP_ID_LEN: usize = 128;

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Check that a shop identifier is usable as an index key.
pub fn validate_shop_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "id".to_string(),
        });
    }
    if id.len() > MAX_SHOP_ID_LEN {
        return Err(ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: format!("longer than {} characters", MAX_SHOP_ID_LEN),
        });
    }
    if id.starts_with('.') {
        return Err(ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: "must not start with '.'".to_string(),
        });
    }
    if let Some(bad) = id.chars().find(|c| !is_id_char(*c)) {
        return Err(ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: format!("character {:?} not allowed", bad),
        });
    }
    Ok(())
}

/// Derive a shop identifier from an owner's wallet address.
///
/// `0xABCDEF...` becomes `shop-abcdef...` (at most 16 address characters).
pub fn shop_id_from_owner(owner: &str) -> Result<String, ValidationError> {
    let trimmed = owner.trim();
    let bare = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let tail: String = bare
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    if tail.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "owner".to_string(),
        });
    }
    Ok(format!("shop-{}", tail))
}

/// Derive a slug identifier from a display name.
///
/// Falls back to a generated identifier when the name has no usable characters.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c != '\'' {
            pending_dash = true;
        }
    }
    slug.truncate(MAX_SHOP_ID_LEN);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        format!("shop-{}", Uuid::now_v7().simple())
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_shop_id() {
        assert!(validate_shop_id("alice-shop").is_ok());
        assert!(validate_shop_id("shop_01.v2").is_ok());
        assert!(validate_shop_id("").is_err());
        assert!(validate_shop_id("../etc").is_err());
        assert!(validate_shop_id("a/b").is_err());
        assert!(validate_shop_id(".hidden").is_err());
        assert!(validate_shop_id(&"x".repeat(MAX_SHOP_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_shop_id_from_owner() {
        assert_eq!(shop_id_from_owner("0xABC").unwrap(), "shop-abc");
        assert_eq!(
            shop_id_from_owner("0x1234567890abcdef1234").unwrap(),
            "shop-1234567890abcdef"
        );
        assert!(shop_id_from_owner("0x").is_err());
        assert!(shop_id_from_owner("   ").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Alice's Goods"), "alices-goods");
        assert_eq!(slugify("  Bob & Sons  Hardware "), "bob-sons-hardware");
        assert!(slugify("!!!").starts_with("shop-"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every derived slug is itself a valid shop id.
        #[test]
        fn prop_slug_is_valid_id(name in ".{0,200}") {
            let slug = slugify(&name);
            prop_assert!(validate_shop_id(&slug).is_ok(), "invalid slug {:?}", slug);
        }

        /// Owner-derived ids are valid whenever derivation succeeds.
        #[test]
        fn prop_owner_id_is_valid(owner in "(0x)?[0-9a-fA-F]{1,40}") {
            let id = shop_id_from_owner(&owner).unwrap();
            prop_assert!(validate_shop_id(&id).is_ok());
        }
    }
}
