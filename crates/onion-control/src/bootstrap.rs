//! Bootstrap readiness polling.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::CommandChannel;
use crate::command::Command;
use crate::error::ControlError;

/// `GETINFO` key reporting bootstrap progress.
pub const BOOTSTRAP_PHASE_KEY: &str = "status/bootstrap-phase";
/// Pause between bootstrap queries.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

const COMPLETE_PROGRESS: u32 = 100;
const PROGRESS_FIELD: &str = "PROGRESS=";
const TAG_FIELD: &str = "TAG=";
const SUMMARY_FIELD: &str = "SUMMARY=\"";
const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Extracts the numeric value of a `PROGRESS=<n>` token, if present.
#[must_use]
pub fn parse_progress(line: &str) -> Option<u32> {
    line.split_whitespace()
        .find_map(|token| token.strip_prefix(PROGRESS_FIELD))
        .and_then(|value| value.parse().ok())
}

/// Parsed bootstrap status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStatus {
    /// Percentage reported by the daemon.
    pub progress: u32,
    /// Machine-readable phase tag.
    pub tag: Option<String>,
    /// Human-readable phase summary.
    pub summary: Option<String>,
}

impl BootstrapStatus {
    /// Parses a status line; `None` when it carries no progress marker.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let progress = parse_progress(line)?;
        let tag = line
            .split_whitespace()
            .find_map(|token| token.strip_prefix(TAG_FIELD))
            .map(str::to_owned);
        let summary = line
            .split_once(SUMMARY_FIELD)
            .and_then(|(_, rest)| rest.split_once('"'))
            .map(|(summary, _)| summary.to_owned());
        Some(Self {
            progress,
            tag,
            summary,
        })
    }

    /// Returns `true` once bootstrap has finished.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress >= COMPLETE_PROGRESS
    }
}

/// Polls the daemon until bootstrap completes or the wait expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapMonitor {
    poll_interval: Duration,
}

impl Default for BootstrapMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapMonitor {
    /// Creates a monitor polling every [`POLL_INTERVAL`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the pause between queries.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Queries bootstrap progress until some reply line reports completion.
    ///
    /// At least one query is always made. Returns `Ok(false)` when `timeout`
    /// elapses first.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::BootstrapQueryRejected`] when the daemon
    /// refuses the query, or the channel error when the exchange fails.
    pub fn await_ready(
        &self,
        channel: &mut dyn CommandChannel,
        timeout: Duration,
    ) -> Result<bool, ControlError> {
        let deadline = Instant::now() + timeout;
        let query = Command::get_info(BOOTSTRAP_PHASE_KEY)?;
        loop {
            let reply = channel.send(&query)?;
            if !reply.is_success() {
                return Err(ControlError::BootstrapQueryRejected {
                    reply: reply.final_line().to_owned(),
                });
            }
            let statuses: Vec<BootstrapStatus> = reply
                .lines()
                .iter()
                .filter_map(|line| BootstrapStatus::parse(line))
                .collect();
            if let Some(latest) = statuses.last() {
                debug!(
                    target: BOOTSTRAP_TARGET,
                    progress = latest.progress,
                    tag = latest.tag.as_deref().unwrap_or("unknown"),
                    "bootstrap progress"
                );
            }
            if statuses.iter().any(BootstrapStatus::is_complete) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}
