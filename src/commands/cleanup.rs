use anyhow::{Context, Result};
use api_log_collector::config::Config;
use api_log_collector::retention::{retention_cutoff, run_retention_now};
use chrono::Local;
use colored::Colorize;

/// Execute the cleanup command
///
/// Runs one retention sweep against the configured store and reports the
/// number of deleted rows.
pub async fn execute(cfg: &Config, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(cfg.retention.days);
    if days == 0 {
        anyhow::bail!("Retention window must be at least 1 day");
    }

    let cutoff = retention_cutoff(Local::now().date_naive(), days);
    println!(
        "{} {}",
        "Deleting entries dated before".yellow(),
        cutoff.format("%Y-%m-%d")
    );

    let store = super::open_store(&cfg.database).await?;
    let deleted = run_retention_now(&store, days)
        .await
        .context("Retention sweep failed")?;
    store.close().await;

    println!("{} {} rows deleted", "✓".green(), deleted);
    Ok(())
}
