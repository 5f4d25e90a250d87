//! Subcommand handlers. Each returns the JSON value printed on stdout.

use std::path::Path;

use bazaar_core::{BazaarError, BazaarResult, ShopExport, ShopQuery, StorageError};
use bazaar_storage::{ReconnectReport, RepairOutcome, ShopManager};
use serde_json::{json, Value};
use tracing::info;

fn io_error(path: &Path, e: std::io::Error) -> BazaarError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn to_value<T: serde::Serialize>(value: &T) -> BazaarResult<Value> {
    serde_json::to_value(value).map_err(BazaarError::serialization)
}

fn report_value(report: &ReconnectReport) -> Value {
    json!({
        "opened": report.opened,
        "failed": report
            .failed
            .iter()
            .map(|f| json!({ "shop_id": f.shop_id, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
    })
}

async fn write_bundle(path: &Path, bundle: &ShopExport) -> BazaarResult<()> {
    let bytes = serde_json::to_vec_pretty(bundle).map_err(BazaarError::serialization)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| io_error(path, e))
}

pub async fn list(manager: &ShopManager, query: &ShopQuery) -> BazaarResult<Value> {
    let shops = manager.list_shops(query).await?;
    to_value(&shops)
}

pub async fn get(manager: &ShopManager, shop_id: &str) -> BazaarResult<Value> {
    let shop = manager.get_shop(shop_id).await?;
    to_value(&shop)
}

pub async fn delete(manager: &ShopManager, shop_id: &str) -> BazaarResult<Value> {
    manager.delete_shop(shop_id).await?;
    Ok(json!({ "deleted": shop_id }))
}

pub async fn export(manager: &ShopManager, shop_id: &str, out: Option<&Path>) -> BazaarResult<Value> {
    let bundle = manager.export_shop(shop_id).await?;
    match out {
        Some(path) => {
            write_bundle(path, &bundle).await?;
            info!(shop_id, path = %path.display(), "Wrote export bundle");
            Ok(json!({ "exported": shop_id, "path": path.display().to_string() }))
        }
        None => to_value(&bundle),
    }
}

/// Write `{dir}/{id}.json` for every readable shop.
pub async fn export_all(manager: &ShopManager, dir: &Path) -> BazaarResult<Value> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| io_error(dir, e))?;

    let bundles = manager.export_all().await?;
    let mut written = Vec::with_capacity(bundles.len());
    for bundle in &bundles {
        let path = dir.join(format!("{}.json", bundle.shop.id));
        write_bundle(&path, bundle).await?;
        written.push(bundle.shop.id.clone());
    }
    info!(count = written.len(), dir = %dir.display(), "Exported shops");
    Ok(json!({ "exported": written, "dir": dir.display().to_string() }))
}

pub async fn import(manager: &ShopManager, file: &Path) -> BazaarResult<Value> {
    let bytes = tokio::fs::read(file).await.map_err(|e| io_error(file, e))?;
    let bundle: ShopExport = serde_json::from_slice(&bytes).map_err(BazaarError::serialization)?;
    let shop = manager.import_shop(bundle).await?;
    to_value(&shop)
}

pub async fn repair(manager: &ShopManager, shop_id: &str) -> BazaarResult<Value> {
    let outcome = manager.repair_shop(shop_id).await?;
    Ok(match outcome {
        RepairOutcome::Reopened => json!({ "shop_id": shop_id, "outcome": "reopened" }),
        RepairOutcome::Recreated { previous } => json!({
            "shop_id": shop_id,
            "outcome": "recreated",
            "previous_address": previous.map(|a| a.to_string()),
        }),
    })
}

pub async fn reload(manager: &ShopManager) -> BazaarResult<Value> {
    let report = manager.reload_all().await?;
    Ok(report_value(&report))
}

pub async fn stats(manager: &ShopManager) -> BazaarResult<Value> {
    let stats = manager.stats().await?;
    to_value(&stats)
}
