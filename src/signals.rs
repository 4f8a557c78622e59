use std::time::Duration;
use tokio::process::Child;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Setup signal handlers for the collector
///
/// Returns a shutdown receiver that flips to `true` once and a join handle
/// for the signal task. A watch channel is used so that monitors started
/// after the signal still observe it.
///
/// Handles:
/// - SIGTERM/SIGINT: Graceful shutdown (stop reading, flush buffered records)
#[cfg(unix)]
pub fn setup_signal_handlers() -> (watch::Receiver<bool>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to setup signal handlers: {}", e);
                    // Keep the sender alive, a dropped sender reads as shutdown
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown");
            }
        }
        let _ = shutdown_tx.send(true);
    });

    (shutdown_rx, handle)
}

/// Windows placeholder - only Ctrl+C is supported
#[cfg(not(unix))]
pub fn setup_signal_handlers() -> (watch::Receiver<bool>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    (shutdown_rx, handle)
}

/// Resolve once shutdown was requested or the sender is gone
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Stop a tail subprocess: SIGTERM first, SIGKILL if it outlives `grace`
pub async fn terminate_child(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(pid = pid, error = %e, "Failed to send SIGTERM to tail process");
        } else if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
            return;
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill tail process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_signal_handlers_starts_not_shut_down() {
        let (shutdown_rx, handle) = setup_signal_handlers();
        assert!(!*shutdown_rx.borrow());
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_sees_earlier_signal() {
        let (tx, _) = watch::channel(false);
        tx.send_replace(true);

        // Subscribed after the signal was sent
        let mut rx = tx.subscribe();
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_on_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_child_stops_long_running_process() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();

        terminate_child(&mut child, Duration::from_secs(2)).await;

        let status = child.try_wait().unwrap();
        assert!(status.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_child_after_exit_is_noop() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();

        terminate_child(&mut child, Duration::from_secs(1)).await;
        assert!(child.try_wait().unwrap().is_some());
    }
}
