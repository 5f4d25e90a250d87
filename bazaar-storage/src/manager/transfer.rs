//! Export and import of portable shop bundles.

use bazaar_core::{
    BazaarError, BazaarResult, ShopExport, ShopFailure, ShopMetadata, ShopQuery, ShopRecord,
    SortField,
};
use tracing::{info, warn};

use super::ShopManager;

impl ShopManager {
    /// Bundle a shop with its index entry.
    pub async fn export_shop(&self, shop_id: &str) -> BazaarResult<ShopExport> {
        let shop = self.get_shop(shop_id).await?;
        let metadata = self
            .index
            .get(shop_id)
            .await?
            .ok_or_else(|| BazaarError::not_found(shop_id))?;
        Ok(ShopExport::new(metadata, shop))
    }

    /// Bundle every readable shop, in id order.
    ///
    /// Follows the listing policy: unreadable shops are skipped and only a
    /// total failure is an error.
    pub async fn export_all(&self) -> BazaarResult<Vec<ShopExport>> {
        let shops = self
            .list_shops(&ShopQuery::new().sorted_by(SortField::Id, false))
            .await?;

        let mut bundles = Vec::with_capacity(shops.len());
        let mut failures = Vec::new();
        for shop in shops {
            match self.index.get(&shop.id).await {
                Ok(Some(metadata)) => bundles.push(ShopExport::new(metadata, shop)),
                Ok(None) => failures.push(ShopFailure {
                    error: BazaarError::not_found(&shop.id),
                    shop_id: shop.id,
                }),
                Err(error) => failures.push(ShopFailure {
                    shop_id: shop.id,
                    error,
                }),
            }
        }

        if bundles.is_empty() && !failures.is_empty() {
            return Err(BazaarError::Aggregate {
                operation: "export_all".to_string(),
                failures,
            });
        }
        for failure in &failures {
            warn!(shop_id = %failure.shop_id, error = %failure.error, "Skipping shop in export");
        }
        info!(exported = bundles.len(), "Exported shops");
        Ok(bundles)
    }

    /// Restore a shop from a bundle, keeping its timestamps.
    ///
    /// The bundle's store address is tried first; if it is absent or will
    /// not open, a new store is created. Any existing shop with the same id
    /// is overwritten.
    pub async fn import_shop(&self, bundle: ShopExport) -> BazaarResult<ShopRecord> {
        bundle.validate()?;
        let ShopExport { metadata, shop, .. } = bundle;
        let shop_id = shop.id.clone();
        let _writes = self.lock_writes(&shop_id).await?;

        if let Err(e) = self.registry.close(&shop_id).await {
            if !e.is_not_open() {
                warn!(shop_id = %shop_id, error = %e, "Failed to close store before import");
            }
        }

        let mut meta = ShopMetadata {
            storage_address: metadata
                .storage_address
                .or_else(|| shop.storage_address.clone()),
            ..shop.metadata()
        };
        self.index.save(&meta).await?;

        let handle = match self.registry.get_or_create(&shop_id).await {
            Ok(handle) => handle,
            Err(e) if e.is_store_unavailable() => {
                info!(shop_id = %shop_id, error = %e, "Bundled store address unusable, creating a new store");
                meta.storage_address = None;
                self.index.save(&meta).await?;
                self.registry.get_or_create(&shop_id).await?
            }
            Err(e) => return Err(e),
        };

        let shop = self.persist(&handle, shop).await?;
        info!(shop_id = %shop.id, address = ?shop.storage_address, "Imported shop");
        Ok(shop)
    }
}
