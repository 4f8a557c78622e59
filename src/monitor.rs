//! Per-program log stream monitor
//!
//! Each monitor spawns the configured tail command for one program and routes
//! every marker line through parser → matcher → batch accumulator:
//!
//! ```text
//! tail stdout ─▶ LineParser ─▶ ApiPathSet::longest_match ─▶ BatchAccumulator ─▶ sink
//! ```
//!
//! Malformed and unmatched lines are skipped. Sink failures are logged and the
//! monitor keeps reading. A read error ends only this monitor; the supervisor
//! decides whether it is restarted.
//!
//! `supervisorctl tail -f` starts by replaying the last part of the log. A
//! restarted monitor therefore holds back its first lines until it sees the
//! last line of the previous run (see [`ResumePoint`]) and drops everything up
//! to it, so replayed entries are not stored twice.

use crate::batch::BatchAccumulator;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, StoreError};
use crate::matcher::ApiPathSet;
use crate::parser::LineParser;
use crate::signals::{terminate_child, wait_for_shutdown};
use crate::store::RecordSink;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Time the tail process gets to exit after SIGTERM
const TAIL_STOP_GRACE: Duration = Duration::from_secs(2);

/// Bytes held back after a restart while looking for the previous last line.
/// `supervisorctl tail` replays 1600 bytes; the rest is slack.
pub const REPLAY_WINDOW_BYTES: usize = 4096;

/// Counters for one monitor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub lines_read: u64,
    pub candidate_lines: u64,
    pub records_matched: u64,
    pub unmatched: u64,
    pub malformed: u64,
    pub batches_flushed: u64,
    pub records_written: u64,
    pub flush_failures: u64,
    /// Lines dropped as a replay of the previous run
    pub replayed: u64,
}

/// Why a monitor run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    EndOfStream,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct MonitorExit {
    pub program: String,
    pub reason: ExitReason,
    pub stats: MonitorStats,
}

/// Last line read for one program, kept across monitor restarts
#[derive(Debug, Default)]
pub struct ResumePoint {
    last_line: Mutex<Option<String>>,
}

impl ResumePoint {
    pub fn last_line(&self) -> Option<String> {
        self.last_line.lock().ok().and_then(|line| line.clone())
    }

    pub fn record(&self, line: impl Into<String>) {
        if let Ok(mut last) = self.last_line.lock() {
            *last = Some(line.into());
        }
    }
}

/// Holds back the start of a restarted stream until the previous last line
/// shows up or the replay window is exceeded.
#[derive(Debug)]
struct ReplayFilter {
    resume_after: String,
    held: Vec<String>,
    held_bytes: usize,
}

enum Replay {
    /// Keep reading, nothing to process yet
    Holding,
    /// The previous last line was found; `n` held lines were replays
    Skipped(usize),
    /// No resume line in the window; process these lines normally
    Release(Vec<String>),
}

impl ReplayFilter {
    fn new(resume_after: String) -> Self {
        Self {
            resume_after,
            held: Vec::new(),
            held_bytes: 0,
        }
    }

    fn admit(&mut self, line: &str) -> Replay {
        if line.trim_end() == self.resume_after {
            return Replay::Skipped(self.held.len() + 1);
        }

        self.held_bytes += line.len();
        self.held.push(line.to_string());
        if self.held_bytes > REPLAY_WINDOW_BYTES {
            return Replay::Release(std::mem::take(&mut self.held));
        }
        Replay::Holding
    }

    fn release(self) -> Vec<String> {
        self.held
    }
}

pub struct StreamMonitor {
    program: String,
    config: Arc<MonitorConfig>,
    parser: LineParser,
    api_paths: Arc<ApiPathSet>,
    sink: Arc<dyn RecordSink>,
    resume: Arc<ResumePoint>,
}

impl StreamMonitor {
    pub fn new(
        program: impl Into<String>,
        config: Arc<MonitorConfig>,
        api_paths: Arc<ApiPathSet>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let parser = LineParser::new(config.marker.clone());
        Self {
            program: program.into(),
            config,
            parser,
            api_paths,
            sink,
            resume: Arc::new(ResumePoint::default()),
        }
    }

    /// Share the resume point of earlier runs of the same program
    pub fn with_resume_point(mut self, resume: Arc<ResumePoint>) -> Self {
        self.resume = resume;
        self
    }

    /// Spawn the tail command and process its output until it ends,
    /// fails, or shutdown is requested.
    pub async fn run(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<MonitorExit, MonitorError> {
        tracing::info!(program = %self.program, "Starting to monitor logs");

        let mut child = self.spawn_tail()?;
        let Some(stdout) = child.stdout.take() else {
            terminate_child(&mut child, TAIL_STOP_GRACE).await;
            return Err(self.spawn_error("stdout was not captured"));
        };

        let result = self.run_stream(BufReader::new(stdout), shutdown).await;
        terminate_child(&mut child, TAIL_STOP_GRACE).await;
        result
    }

    /// Process an already opened line stream
    pub async fn run_stream<R>(
        &self,
        mut reader: R,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<MonitorExit, MonitorError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut acc = BatchAccumulator::new(self.sink.clone(), self.config.batch_size);
        let mut stats = MonitorStats::default();
        let mut flush_timer = self.config.flush_interval().map(|period| {
            let mut timer = time::interval_at(time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        let mut replay = self.resume.last_line().map(ReplayFilter::new);
        let mut last_line = String::new();
        // Partially read bytes survive a cancelled read_until, so the buffer
        // is only cleared after a complete line was handled.
        let mut buf = Vec::with_capacity(512);

        let outcome = loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => {
                    match read {
                        Ok(0) => break Ok(ExitReason::EndOfStream),
                        Ok(_) => {
                            {
                                let line = String::from_utf8_lossy(&buf);
                                stats.lines_read += 1;
                                self.admit_line(&line, &mut replay, &mut acc, &mut stats).await;
                                let trimmed = line.trim_end();
                                if !trimmed.is_empty() {
                                    last_line.clear();
                                    last_line.push_str(trimmed);
                                }
                            }
                            buf.clear();
                        }
                        Err(source) => break Err(source),
                    }
                }
                _ = next_tick(&mut flush_timer) => {
                    let result = acc.flush_pending().await;
                    self.record_flush(result, &mut stats, "interval");
                }
                _ = wait_for_shutdown(&mut shutdown) => break Ok(ExitReason::Shutdown),
            }
        };

        if let Some(filter) = replay.take() {
            for held in filter.release() {
                self.handle_line(&held, &mut acc, &mut stats).await;
            }
        }
        self.finish(&mut acc, &mut stats).await;
        if !last_line.is_empty() {
            self.resume.record(last_line);
        }

        let reason = match outcome {
            Ok(reason) => reason,
            Err(source) => {
                return Err(MonitorError::Read {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        tracing::info!(
            program = %self.program,
            reason = ?reason,
            lines = stats.lines_read,
            matched = stats.records_matched,
            written = stats.records_written,
            replayed = stats.replayed,
            "Stopped monitoring logs"
        );

        Ok(MonitorExit {
            program: self.program.clone(),
            reason,
            stats,
        })
    }

    /// Pass a line through the replay filter of a restarted run
    async fn admit_line(
        &self,
        line: &str,
        replay: &mut Option<ReplayFilter>,
        acc: &mut BatchAccumulator,
        stats: &mut MonitorStats,
    ) {
        let Some(filter) = replay.as_mut() else {
            self.handle_line(line, acc, stats).await;
            return;
        };

        match filter.admit(line) {
            Replay::Holding => {}
            Replay::Skipped(count) => {
                stats.replayed += count as u64;
                tracing::debug!(program = %self.program, count = count, "Skipped replayed lines");
                *replay = None;
            }
            Replay::Release(held) => {
                tracing::debug!(
                    program = %self.program,
                    "Previous last line not found in replay window"
                );
                *replay = None;
                for held_line in held {
                    self.handle_line(&held_line, acc, stats).await;
                }
            }
        }
    }

    async fn handle_line(&self, line: &str, acc: &mut BatchAccumulator, stats: &mut MonitorStats) {
        if !self.parser.is_candidate(line) {
            return;
        }
        stats.candidate_lines += 1;

        let record = match self.parser.parse(line, &self.config.server, &self.program) {
            Ok(record) => record,
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(program = %self.program, error = %e, "Skipping malformed log line");
                return;
            }
        };

        let Some(prefix) = self.api_paths.longest_match(&record.api_path) else {
            stats.unmatched += 1;
            tracing::debug!(
                program = %self.program,
                api_path = %record.api_path,
                "API path did not match"
            );
            return;
        };

        stats.records_matched += 1;
        let result = acc.add(record.with_api_path(prefix)).await;
        self.record_flush(result, stats, "size");
    }

    /// Flush the remainder at end of stream
    async fn finish(&self, acc: &mut BatchAccumulator, stats: &mut MonitorStats) {
        let result = acc.flush_remainder().await;
        self.record_flush(result, stats, "end-of-stream");
    }

    fn record_flush(
        &self,
        result: Result<usize, StoreError>,
        stats: &mut MonitorStats,
        trigger: &str,
    ) {
        match result {
            Ok(0) => {}
            Ok(count) => {
                stats.batches_flushed += 1;
                stats.records_written += count as u64;
                tracing::debug!(
                    program = %self.program,
                    count = count,
                    trigger = trigger,
                    "Log entries inserted"
                );
            }
            Err(e) => {
                stats.flush_failures += 1;
                tracing::error!(
                    program = %self.program,
                    error = %e,
                    trigger = trigger,
                    "Failed to insert log entries"
                );
            }
        }
    }

    fn spawn_tail(&self) -> Result<Child, MonitorError> {
        let (binary, args) = self
            .config
            .tail_command
            .split_first()
            .ok_or_else(|| self.spawn_error("tail command is empty"))?;

        Command::new(binary)
            .args(args)
            .arg(&self.program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&e.to_string()))
    }

    fn spawn_error(&self, reason: &str) -> MonitorError {
        MonitorError::Spawn {
            program: self.program.clone(),
            command: format!("{} {}", self.config.tail_command.join(" "), self.program),
            reason: reason.to_string(),
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
