//! Supervision of stream monitors
//!
//! Every monitor runs in its own task and reports its outcome over a channel.
//! A failing monitor never takes the others down: the supervisor logs the
//! outcome and restarts that program according to the [`RestartPolicy`],
//! after a fixed delay.

use crate::config::{MonitorConfig, RestartPolicy};
use crate::error::MonitorError;
use crate::matcher::ApiPathSet;
use crate::monitor::{ExitReason, MonitorExit, MonitorStats, ResumePoint, StreamMonitor};
use crate::signals::wait_for_shutdown;
use crate::store::RecordSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Outcome of one monitor run, sent to the supervisor
#[derive(Debug)]
pub struct MonitorReport {
    pub program: String,
    pub outcome: Result<MonitorExit, MonitorError>,
}

/// Totals over the lifetime of the supervisor
#[derive(Debug, Clone, Default)]
pub struct SupervisorSummary {
    pub runs: u64,
    pub failures: u64,
    pub restarts: u64,
    pub records_written: u64,
    /// Runs per program
    pub runs_by_program: HashMap<String, u64>,
}

pub struct Supervisor {
    config: Arc<MonitorConfig>,
    api_paths: Arc<ApiPathSet>,
    sink: Arc<dyn RecordSink>,
}

impl Supervisor {
    pub fn new(
        config: Arc<MonitorConfig>,
        api_paths: Arc<ApiPathSet>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            config,
            api_paths,
            sink,
        }
    }

    /// Run all monitors until shutdown, or until every monitor has exited
    /// without being restarted.
    ///
    /// On shutdown no further restarts happen and the supervisor waits for
    /// running monitors to flush their remainder.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SupervisorSummary {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<MonitorReport>();
        let mut summary = SupervisorSummary::default();
        let mut active = 0usize;
        let mut shutting_down = false;
        let resume_points: HashMap<String, Arc<ResumePoint>> = self
            .config
            .programs
            .iter()
            .map(|program| (program.clone(), Arc::new(ResumePoint::default())))
            .collect();

        for program in &self.config.programs {
            let resume = resume_points[program].clone();
            self.launch(program.clone(), Duration::ZERO, resume, &report_tx, shutdown.clone());
            active += 1;
        }

        tracing::info!(programs = active, "Supervisor started");

        while active > 0 {
            tokio::select! {
                Some(report) = report_rx.recv() => {
                    active -= 1;
                    summary.runs += 1;
                    *summary.runs_by_program.entry(report.program.clone()).or_default() += 1;

                    let failed = self.log_report(&report, &mut summary);
                    if shutting_down || *shutdown.borrow() {
                        continue;
                    }

                    if should_restart(self.config.restart, failed) {
                        let delay = self.config.restart_delay();
                        tracing::info!(
                            program = %report.program,
                            delay_secs = delay.as_secs(),
                            "Restarting monitor"
                        );
                        summary.restarts += 1;
                        let resume = resume_points
                            .get(&report.program)
                            .cloned()
                            .unwrap_or_default();
                        self.launch(report.program, delay, resume, &report_tx, shutdown.clone());
                        active += 1;
                    } else {
                        tracing::warn!(program = %report.program, "Monitor will not be restarted");
                    }
                }
                _ = wait_for_shutdown(&mut shutdown), if !shutting_down => {
                    tracing::info!(
                        active = active,
                        "Shutdown requested, waiting for monitors to flush"
                    );
                    shutting_down = true;
                }
            }
        }

        tracing::info!(
            runs = summary.runs,
            failures = summary.failures,
            restarts = summary.restarts,
            records_written = summary.records_written,
            "Supervisor stopped"
        );
        summary
    }

    fn launch(
        &self,
        program: String,
        delay: Duration,
        resume: Arc<ResumePoint>,
        report_tx: &mpsc::UnboundedSender<MonitorReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let monitor = StreamMonitor::new(
            program.clone(),
            self.config.clone(),
            self.api_paths.clone(),
            self.sink.clone(),
        )
        .with_resume_point(resume);
        let report_tx = report_tx.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = tokio::time::sleep(delay) => monitor.run(shutdown.clone()).await,
                _ = wait_for_shutdown(&mut shutdown) => Ok(MonitorExit {
                    program: program.clone(),
                    reason: ExitReason::Shutdown,
                    stats: MonitorStats::default(),
                }),
            };

            let _ = report_tx.send(MonitorReport { program, outcome });
        });
    }

    /// Log a finished run; returns whether it failed
    fn log_report(&self, report: &MonitorReport, summary: &mut SupervisorSummary) -> bool {
        match &report.outcome {
            Ok(exit) => {
                summary.records_written += exit.stats.records_written;
                tracing::info!(
                    program = %report.program,
                    reason = ?exit.reason,
                    records_written = exit.stats.records_written,
                    "Monitor exited"
                );
                false
            }
            Err(e) => {
                summary.failures += 1;
                tracing::error!(program = %report.program, error = %e, "Monitor failed");
                true
            }
        }
    }
}

fn should_restart(policy: RestartPolicy, failed: bool) -> bool {
    match policy {
        RestartPolicy::Always => true,
        RestartPolicy::OnFailure => failed,
        RestartPolicy::Never => false,
    }
}
