//! Bulk listing with bounded concurrency and partial-failure tolerance.

use std::sync::{Arc, Mutex};

use bazaar_core::{BazaarError, BazaarResult, ShopFailure, ShopQuery, ShopRecord, StorageError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ShopManager;

type Outcomes = Arc<Mutex<Vec<(String, BazaarResult<ShopRecord>)>>>;

impl ShopManager {
    /// List shops matching `query`.
    ///
    /// See [`ShopQuery`] for how pagination and the owner filter interact.
    pub async fn list_shops(&self, query: &ShopQuery) -> BazaarResult<Vec<ShopRecord>> {
        self.list_shops_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// List shops, stopping new fetches once `cancel` fires.
    ///
    /// Fetches already running are allowed to finish. Shops that fail to
    /// load are logged and skipped; the call only errors when every fetched
    /// shop failed, or when it was cancelled before producing anything.
    /// Shops deleted while the listing runs are left out without counting
    /// as failures.
    pub async fn list_shops_with_cancel(
        &self,
        query: &ShopQuery,
        cancel: &CancellationToken,
    ) -> BazaarResult<Vec<ShopRecord>> {
        let ids = self.index.list_ids().await?;
        let page = query.page(&ids).to_vec();
        if page.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.list_concurrency));
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::with_capacity(page.len())));
        let mut workers = JoinSet::new();
        let mut cancelled = false;

        for shop_id in page {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|_| BazaarError::Cancelled)?
                }
            };

            let manager = self.clone();
            let outcomes = Arc::clone(&outcomes);
            workers.spawn(async move {
                let _permit = permit;
                let outcome = manager.get_shop(&shop_id).await;
                if let Ok(mut outcomes) = outcomes.lock() {
                    outcomes.push((shop_id, outcome));
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Listing worker did not finish");
            }
        }

        let collected = std::mem::take(&mut *outcomes.lock().map_err(|_| StorageError::LockPoisoned)?);
        let mut shops = Vec::with_capacity(collected.len());
        let mut failures = Vec::new();
        for (shop_id, outcome) in collected {
            match outcome {
                Ok(shop) => shops.push(shop),
                // Deleted after the ids were read
                Err(error) if error.is_not_found() => {
                    debug!(shop_id = %shop_id, "Shop vanished during listing");
                }
                Err(error) => failures.push(ShopFailure { shop_id, error }),
            }
        }

        if shops.is_empty() && !failures.is_empty() {
            return Err(BazaarError::Aggregate {
                operation: "list_shops".to_string(),
                failures,
            });
        }
        if cancelled && shops.is_empty() {
            return Err(BazaarError::Cancelled);
        }
        for failure in &failures {
            warn!(shop_id = %failure.shop_id, error = %failure.error, "Skipping shop in listing");
        }

        shops.retain(|shop| query.matches(shop));
        query.sort(&mut shops);
        debug!(
            returned = shops.len(),
            failed = failures.len(),
            cancelled,
            "Listed shops"
        );
        Ok(shops)
    }
}
