//! Command implementations for the CLI
//!
//! - start: Run the collector
//! - test: Validate configuration and the API list
//! - cleanup: Run one retention sweep

pub mod cleanup;
pub mod start;

use anyhow::{Context, Result};
use api_log_collector::config::{mask_dsn, DatabaseConfig};
use api_log_collector::store::LogStore;
use std::path::Path;

/// Open the configured store, creating the directory of a SQLite file if needed
pub(crate) async fn open_store(database: &DatabaseConfig) -> Result<LogStore> {
    if let Some(parent) = sqlite_parent_dir(&database.url) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    LogStore::connect(&database.url, database.max_connections)
        .await
        .with_context(|| format!("Failed to open database: {}", mask_dsn(&database.url)))
}

fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url.strip_prefix("sqlite:")?;
    let path = path.strip_prefix("//").unwrap_or(path);
    let path = path.split('?').next()?;

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}
