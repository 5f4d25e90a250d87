//! Bazaar CLI - inspect and maintain shop storage.
//!
//! # Usage
//!
//! ```bash
//! # List the first ten shops owned by a wallet, newest first
//! bazaar list --owner 0xABC --limit 10 --sort created --desc
//!
//! # Back up every shop into a directory, then restore one
//! bazaar export-all --dir ./backup
//! bazaar import ./backup/alice-shop.json
//!
//! # Rebuild a shop whose store will not open
//! bazaar repair alice-shop
//! ```
//!
//! Results are printed as JSON on stdout. Logs go to stderr and follow
//! `RUST_LOG` (default `bazaar=info`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use bazaar_core::{BazaarConfig, BazaarError, BazaarResult, ConfigError, ShopQuery, SortField};
use bazaar_storage::ShopManager;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

/// Environment variable selecting the log format (`json` or `plain`).
const LOG_FORMAT_ENV: &str = "BAZAAR_LOG_FORMAT";

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar shop storage tools")]
struct Cli {
    /// Config file (TOML); falls back to BAZAAR_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List shops
    List {
        /// Only shops owned by this address
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Sort field (name, id, owner, created, updated)
        #[arg(long, default_value = "name")]
        sort: SortField,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Show one shop
    Get { id: String },
    /// Delete a shop and its index entry
    Delete { id: String },
    /// Export one shop as a bundle
    Export {
        id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Export every shop into a directory, one bundle per shop
    ExportAll {
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Import a bundle written by `export`
    Import { file: PathBuf },
    /// Reopen or recreate a shop's store
    Repair { id: String },
    /// Close and reopen every store
    Reload,
    /// Show index, registry and cache counters
    Stats,
}

fn init_logging(json: bool) -> BazaarResult<()> {
    let json = json
        || std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bazaar=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| {
        BazaarError::from(ConfigError::InvalidValue {
            field: LOG_FORMAT_ENV.to_string(),
            value: if json { "json" } else { "plain" }.to_string(),
            reason: format!("failed to install subscriber: {}", e),
        })
    })
}

#[tokio::main]
async fn main() -> BazaarResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let config = BazaarConfig::load(cli.config.as_deref())?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let manager = ShopManager::open_lmdb(&config).await?;
    let result = run(&manager, cli.command).await;

    if let Err(e) = manager.shutdown().await {
        tracing::warn!(error = %e, "Shutdown did not close every store");
    }

    let output = result?;
    let rendered = serde_json::to_string_pretty(&output).map_err(BazaarError::serialization)?;
    println!("{}", rendered);
    Ok(())
}

async fn run(manager: &ShopManager, command: Commands) -> BazaarResult<serde_json::Value> {
    match command {
        Commands::List {
            owner,
            limit,
            offset,
            sort,
            desc,
        } => {
            let mut query = ShopQuery::new().with_offset(offset).sorted_by(sort, desc);
            if let Some(owner) = owner {
                query = query.with_owner(owner);
            }
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            commands::list(manager, &query).await
        }
        Commands::Get { id } => commands::get(manager, &id).await,
        Commands::Delete { id } => commands::delete(manager, &id).await,
        Commands::Export { id, out } => commands::export(manager, &id, out.as_deref()).await,
        Commands::ExportAll { dir } => commands::export_all(manager, &dir).await,
        Commands::Import { file } => commands::import(manager, &file).await,
        Commands::Repair { id } => commands::repair(manager, &id).await,
        Commands::Reload => commands::reload(manager).await,
        Commands::Stats => commands::stats(manager).await,
    }
}
