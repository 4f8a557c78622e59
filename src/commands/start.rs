use anyhow::Result;
use api_log_collector::config::{mask_dsn, Config};
use api_log_collector::matcher::ApiPathSet;
use api_log_collector::retention::spawn_retention_task;
use api_log_collector::signals::{setup_signal_handlers, wait_for_shutdown};
use api_log_collector::store::RecordSink;
use api_log_collector::supervisor::Supervisor;
use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};

/// Execute the start command
///
/// This will:
/// 1. Load the API list and open the store (failures are fatal)
/// 2. Start the retention task and one monitor per program
/// 3. Run until SIGTERM/SIGINT, then flush and close the store
pub async fn execute(cfg: Config) -> Result<()> {
    println!("{}", "Starting API log collector...".green());

    let api_paths = Arc::new(ApiPathSet::load(&cfg.api_list.path)?);
    info!(
        path = %cfg.api_list.path.display(),
        prefixes = api_paths.len(),
        "API list loaded"
    );

    let store = super::open_store(&cfg.database).await?;
    info!(url = %mask_dsn(&cfg.database.url), "Database ready");

    let (mut shutdown_rx, signal_handle) = setup_signal_handlers();
    let sink: Arc<dyn RecordSink> = Arc::new(store.clone());

    let retention_handle =
        spawn_retention_task(sink.clone(), cfg.retention.clone(), shutdown_rx.clone());

    info!(
        server = %cfg.monitor.server,
        programs = ?cfg.monitor.programs,
        batch_size = cfg.monitor.batch_size,
        "Starting monitors"
    );

    let supervisor = Supervisor::new(Arc::new(cfg.monitor.clone()), api_paths, sink);
    let summary = supervisor.run(shutdown_rx.clone()).await;

    if !*shutdown_rx.borrow() {
        // Every monitor exited for good; keep sweeping until told to stop
        warn!("No programs are being monitored");
        wait_for_shutdown(&mut shutdown_rx).await;
    }

    if let Err(e) = retention_handle.await {
        warn!(error = %e, "Retention task ended abnormally");
    }
    signal_handle.abort();
    store.close().await;

    info!(
        records_written = summary.records_written,
        failures = summary.failures,
        restarts = summary.restarts,
        "Collector stopped"
    );
    Ok(())
}
