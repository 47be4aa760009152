//! Download run statistics.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::download::{FailureReason, TransferOutcome};

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every dispatched transfer settled and nothing was left to dispatch.
    Completed,
    /// Cancellation stopped the run early.
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Resources listed by the catalog.
    pub total: usize,
    /// Transfers started.
    pub dispatched: usize,
    /// Transfers that wrote their whole file.
    pub succeeded: usize,
    /// Transfers that failed for any reason, including cancellation.
    pub failed: usize,
    /// Failed transfers that were force-closed by cancellation.
    pub cancelled: usize,
    /// Body bytes written by successful transfers.
    pub bytes_written: u64,
    /// Highest number of transfers in flight at once.
    pub peak_active: usize,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Total elapsed time for the run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Number of transfers that reached a terminal outcome.
    #[must_use]
    pub const fn settled(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Returns true if the catalog listed nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns the average download speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_written as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Accumulates transfer outcomes into a [`RunReport`].
#[derive(Debug)]
pub struct RunStatsBuilder {
    started_at: DateTime<Utc>,
    start: Instant,
    total: usize,
    dispatched: usize,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    bytes_written: u64,
    peak_active: usize,
}

impl Default for RunStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatsBuilder {
    /// Starts the run clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
            total: 0,
            dispatched: 0,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            bytes_written: 0,
            peak_active: 0,
        }
    }

    /// Sets the number of listed resources.
    pub const fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    /// Counts one dispatched transfer.
    pub const fn record_dispatch(&mut self) {
        self.dispatched += 1;
    }

    /// Counts one settled transfer.
    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Completed { bytes, .. } => {
                self.succeeded += 1;
                self.bytes_written += *bytes;
            }
            TransferOutcome::Failed(reason) => {
                self.failed += 1;
                if matches!(reason, FailureReason::Cancelled) {
                    self.cancelled += 1;
                }
            }
        }
    }

    /// Sets the peak number of concurrent transfers.
    pub const fn set_peak_active(&mut self, peak: usize) {
        self.peak_active = peak;
    }

    /// Builds the final report.
    #[must_use]
    pub fn build(&self, outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            total: self.total,
            dispatched: self.dispatched,
            succeeded: self.succeeded,
            failed: self.failed,
            cancelled: self.cancelled,
            bytes_written: self.bytes_written,
            peak_active: self.peak_active,
            started_at: self.started_at,
            elapsed: self.start.elapsed(),
        }
    }
}
