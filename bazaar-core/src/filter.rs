//! Listing queries: owner filter, pagination and ordering.

use crate::ShopRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Field to order listings by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Id,
    Owner,
    Created,
    Updated,
}

impl SortField {
    /// Compare two shops on this field, tie-breaking on id.
    pub fn compare(self, a: &ShopRecord, b: &ShopRecord) -> Ordering {
        let primary = match self {
            Self::Name => a.name.cmp(&b.name),
            Self::Id => Ordering::Equal,
            Self::Owner => a.owner.cmp(&b.owner),
            Self::Created => a.created_at.cmp(&b.created_at),
            Self::Updated => a.updated_at.cmp(&b.updated_at),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "id" => Ok(Self::Id),
            "owner" => Ok(Self::Owner),
            "created" | "created_at" => Ok(Self::Created),
            "updated" | "updated_at" => Ok(Self::Updated),
            other => Err(format!("unknown sort field '{}'", other)),
        }
    }
}

/// Parameters for listing shops.
///
/// `offset` and `limit` page over the sorted list of known identifiers
/// before any record is fetched; the owner filter runs on the fetched
/// records afterwards. A page can therefore hold fewer matches than
/// `limit` even when later pages contain more.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopQuery {
    pub owner: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub sort_by: SortField,
    pub sort_desc: bool,
}

impl ShopQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep shops owned by `owner`.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn sorted_by(mut self, field: SortField, descending: bool) -> Self {
        self.sort_by = field;
        self.sort_desc = descending;
        self
    }

    /// Apply offset and limit to an identifier list.
    pub fn page<'a, T>(&self, ids: &'a [T]) -> &'a [T] {
        let start = self.offset.min(ids.len());
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(ids.len()),
            None => ids.len(),
        };
        &ids[start..end]
    }

    /// Whether a fetched record passes the owner filter.
    pub fn matches(&self, shop: &ShopRecord) -> bool {
        self.owner.as_deref().map_or(true, |owner| shop.owner == owner)
    }

    /// Stable sort in the requested direction.
    pub fn sort(&self, shops: &mut [ShopRecord]) {
        let field = self.sort_by;
        if self.sort_desc {
            shops.sort_by(|a, b| field.compare(b, a));
        } else {
            shops.sort_by(|a, b| field.compare(a, b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shop(id: &str, owner: &str, name: &str) -> ShopRecord {
        ShopRecord::new(id, owner, name)
    }

    #[test]
    fn test_page_bounds() {
        let ids = vec!["a", "b", "c", "d"];
        assert_eq!(ShopQuery::new().page(&ids), &["a", "b", "c", "d"]);
        assert_eq!(ShopQuery::new().with_offset(1).with_limit(2).page(&ids), &["b", "c"]);
        assert_eq!(ShopQuery::new().with_offset(3).with_limit(10).page(&ids), &["d"]);
        assert!(ShopQuery::new().with_offset(10).page(&ids).is_empty());
        assert!(ShopQuery::new().with_limit(0).page(&ids).is_empty());
    }

    #[test]
    fn test_owner_filter() {
        let q = ShopQuery::new().with_owner("0xABC");
        assert!(q.matches(&shop("a", "0xABC", "A")));
        assert!(!q.matches(&shop("b", "0xDEF", "B")));
        assert!(ShopQuery::new().matches(&shop("b", "0xDEF", "B")));
    }

    #[test]
    fn test_sort_by_name_desc_with_id_tiebreak() {
        let mut shops = vec![
            shop("b", "o", "Same"),
            shop("c", "o", "Alpha"),
            shop("a", "o", "Same"),
        ];
        ShopQuery::new().sorted_by(SortField::Name, false).sort(&mut shops);
        let ids: Vec<_> = shops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        ShopQuery::new().sorted_by(SortField::Name, true).sort(&mut shops);
        let ids: Vec<_> = shops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_sort_field_from_str() {
        assert_eq!("Owner".parse::<SortField>(), Ok(SortField::Owner));
        assert_eq!("created_at".parse::<SortField>(), Ok(SortField::Created));
        assert!("price".parse::<SortField>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Descending order is exactly the reverse of ascending order.
        #[test]
        fn prop_desc_reverses_asc(names in prop::collection::vec("[a-c]{1,2}", 0..20)) {
            let shops: Vec<ShopRecord> = names
                .iter()
                .enumerate()
                .map(|(i, n)| shop(&format!("id-{:02}", i), "o", n))
                .collect();

            let mut asc = shops.clone();
            ShopQuery::new().sorted_by(SortField::Name, false).sort(&mut asc);
            let mut desc = shops;
            ShopQuery::new().sorted_by(SortField::Name, true).sort(&mut desc);
            desc.reverse();

            prop_assert_eq!(asc, desc);
        }
    }
}
