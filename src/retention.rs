//! Background retention sweep
//!
//! Deletes rows older than the retention window on a fixed period. The first
//! sweep runs at startup. A failed sweep is logged and the next tick runs as
//! scheduled.

use crate::config::RetentionConfig;
use crate::error::StoreError;
use crate::signals::wait_for_shutdown;
use crate::store::RecordSink;
use chrono::{Days, Local, NaiveDate};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// First date that is kept when sweeping on `today`
pub fn retention_cutoff(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Spawn the periodic retention task
///
/// # Example
///
/// ```ignore
/// let handle = spawn_retention_task(store.clone(), cfg.retention.clone(), shutdown_rx.clone());
/// ```
pub fn spawn_retention_task(
    sink: Arc<dyn RecordSink>,
    config: RetentionConfig,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        retention_loop(sink, config, shutdown).await;
    })
}

async fn retention_loop(
    sink: Arc<dyn RecordSink>,
    config: RetentionConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        tracing::info!(retention_days = config.days, "Cleaning old log entries");

        match sweep(sink.as_ref(), config.days).await {
            Ok(deleted) => {
                tracing::info!(rows_deleted = deleted, "Retention sweep completed");
            }
            Err(e) => {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    }

    tracing::info!("Retention task shutting down");
}

/// Run one sweep immediately (for manual triggering)
pub async fn run_retention_now(sink: &dyn RecordSink, days: u32) -> Result<u64, StoreError> {
    tracing::info!(retention_days = days, "Running manual retention sweep");

    let deleted = sweep(sink, days).await?;

    tracing::info!(rows_deleted = deleted, "Manual retention sweep completed");
    Ok(deleted)
}

async fn sweep(sink: &dyn RecordSink, days: u32) -> Result<u64, StoreError> {
    let cutoff = retention_cutoff(Local::now().date_naive(), days);
    sink.delete_older_than(cutoff).await
}
