//! Download coordinator.
//!
//! A run lists a collection through a [`Catalog`], then dispatches one
//! [`Transfer`] task per resource in listing order while keeping at most
//! `concurrent_files` of them in flight. With [`WindowPolicy::Batch`] a full
//! window must drain completely before the next resource is dispatched; with
//! [`WindowPolicy::Sliding`] any settled transfer frees its slot.
//!
//! ```text
//! Idle --start--> Running --all settled--> Completed --acknowledge--> Idle
//!                    |
//!                    +-----cancel-------> Cancelled --acknowledge--> Idle
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogClient, ResourceRef};
use crate::config::{DownloadConfig, WindowPolicy};
use crate::download::{FailureReason, Transfer, TransferOutcome, file_name_from_url};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::progress::{LineKind, ProgressSink};
use crate::state::{ProgressSnapshot, RunState};
use crate::stats::{RunOutcome, RunReport, RunStatsBuilder};

/// Lifecycle phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ready for a new run.
    Idle,
    /// A run is listing or transferring.
    Running,
    /// The last run finished; waiting to be acknowledged.
    Completed,
    /// The last run was cancelled; waiting to be acknowledged.
    Cancelled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Collection whose resources should be downloaded.
    pub collection_id: String,
    /// Optional resource type abbreviation.
    pub type_filter: Option<String>,
    /// Directory that receives the files.
    pub dest_dir: Option<PathBuf>,
}

impl RunRequest {
    /// Creates a request for `collection_id` with no filter or destination.
    #[must_use]
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            ..Self::default()
        }
    }

    /// Restricts the run to one resource type. An empty string clears the filter.
    #[must_use]
    pub fn with_type_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.type_filter = (!filter.is_empty()).then_some(filter);
        self
    }

    /// Sets the destination directory.
    #[must_use]
    pub fn with_dest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dest_dir = Some(dir.into());
        self
    }
}

/// Checks that `id` is a UUID.
///
/// # Errors
///
/// Returns [`Error::InvalidCollectionId`] otherwise.
pub fn validate_collection_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| Error::InvalidCollectionId(id.to_string()))
}

fn lock_phase(phase: &Mutex<Phase>) -> MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves the coordinator out of `Running` when a run ends, however it ends.
///
/// If the run future is dropped mid-flight, open transfers are force-closed
/// and the phase becomes `Cancelled`.
struct RunGuard<'a> {
    phase: &'a Mutex<Phase>,
    state: &'a RunState,
    armed: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, next: Phase) {
        *lock_phase(self.phase) = next;
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let closed = self.state.cancel_all();
            log::warn!("Run abandoned with {closed} transfer(s) open");
            *lock_phase(self.phase) = Phase::Cancelled;
        }
    }
}

/// Runs bounded, cancellable bulk downloads.
pub struct Coordinator<C: Catalog = CatalogClient, F: FileSystem = TokioFileSystem> {
    catalog: C,
    transfer: Arc<Transfer<F>>,
    config: DownloadConfig,
    phase: Mutex<Phase>,
    state: Arc<RunState>,
}

impl<C: Catalog, F: FileSystem + 'static> Coordinator<C, F> {
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new(catalog: C, transfer: Transfer<F>, config: DownloadConfig) -> Self {
        Self {
            catalog,
            transfer: Arc::new(transfer),
            config,
            phase: Mutex::new(Phase::Idle),
            state: Arc::new(RunState::new()),
        }
    }

    /// Returns the catalog used for listings.
    #[must_use]
    pub const fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Returns the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *lock_phase(&self.phase)
    }

    /// Returns the counters of the current or most recent run.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.snapshot()
    }

    /// Returns a terminal phase to `Idle` and reports the phase it left.
    ///
    /// Has no effect while a run is in progress.
    pub fn acknowledge(&self) -> Phase {
        let mut phase = lock_phase(&self.phase);
        let previous = *phase;
        if matches!(previous, Phase::Completed | Phase::Cancelled) {
            *phase = Phase::Idle;
        }
        previous
    }

    /// Requests cancellation of the running run.
    ///
    /// Stops further dispatch, force-closes every open transfer and returns
    /// how many were closed. Returns 0 when no run is in progress.
    pub fn cancel(&self) -> usize {
        if self.phase() != Phase::Running {
            return 0;
        }
        let closed = self.state.cancel_all();
        log::info!("Cancellation requested, closed {closed} transfer(s)");
        closed
    }

    /// Lists `request.collection_id` and downloads every resource.
    ///
    /// Runs to completion on the calling task; use [`cancel`](Self::cancel)
    /// from another task to stop it. Per-resource failures are reported to
    /// `sink` and counted in the report, never returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the coordinator is not idle, a validation
    /// error for a bad collection id or missing destination, or the listing
    /// error if the catalog could not be read.
    pub async fn start(
        &self,
        request: RunRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<RunReport> {
        let (collection_id, dest_dir) = match self.prepare(&request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                report_error(sink.as_ref(), &e);
                return Err(e);
            }
        };

        let guard = RunGuard {
            phase: &self.phase,
            state: &self.state,
            armed: true,
        };
        log::info!(
            "Starting run for collection {collection_id} into {}",
            dest_dir.display()
        );

        match self.run(&collection_id, &request, &dest_dir, sink.as_ref()).await {
            Ok(report) => {
                guard.finish(match report.outcome {
                    RunOutcome::Completed => Phase::Completed,
                    RunOutcome::Cancelled => Phase::Cancelled,
                });
                log::info!(
                    "Run {:?}: {} succeeded, {} failed of {}",
                    report.outcome,
                    report.succeeded,
                    report.failed,
                    report.total
                );
                Ok(report)
            }
            Err(e) => {
                guard.finish(Phase::Idle);
                report_error(sink.as_ref(), &e);
                Err(e)
            }
        }
    }

    /// Validates the request and moves `Idle` to `Running`.
    ///
    /// Returns the collection id in canonical hyphenated form and the
    /// destination directory.
    async fn prepare(&self, request: &RunRequest) -> Result<(String, PathBuf)> {
        let phase = self.phase();
        if phase != Phase::Idle {
            return Err(Error::Busy(phase));
        }

        let collection_id = validate_collection_id(&request.collection_id)?
            .hyphenated()
            .to_string();
        let dest_dir = request
            .dest_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(Error::MissingDestination)?;
        if !self.transfer.fs().is_dir(&dest_dir).await {
            self.transfer.fs().create_dir_all(&dest_dir).await?;
        }

        let mut phase = lock_phase(&self.phase);
        if *phase != Phase::Idle {
            return Err(Error::Busy(*phase));
        }
        self.state.reset();
        *phase = Phase::Running;
        Ok((collection_id, dest_dir))
    }

    async fn run(
        &self,
        collection_id: &str,
        request: &RunRequest,
        dest_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport> {
        let mut stats = RunStatsBuilder::new();
        sink.on_progress(0.0);

        let cancel = self.state.cancel_token();
        let filter = request.type_filter.as_deref().filter(|f| !f.is_empty());
        let listing = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            res = self.catalog.list_resources(collection_id, filter) => Some(res?),
        };
        let Some(resources) = listing else {
            sink.on_log_line(LineKind::Info, "Download cancelled");
            return Ok(stats.build(RunOutcome::Cancelled));
        };

        stats.set_total(resources.len());
        self.state.set_total(resources.len());

        if resources.is_empty() {
            log::warn!("Collection {collection_id} has no resources");
            sink.on_log_line(LineKind::Error, "Error: No data found.");
            sink.on_no_data_found();
            return Ok(stats.build(RunOutcome::Completed));
        }

        let limit = self.config.limit();
        let mut in_flight = JoinSet::new();
        let mut outcome = RunOutcome::Completed;

        for (index, resource) in resources.into_iter().enumerate() {
            if in_flight.len() >= limit {
                match self.config.window {
                    WindowPolicy::Batch => {
                        while let Some(joined) = in_flight.join_next().await {
                            self.settle(joined, &mut stats, sink);
                        }
                    }
                    WindowPolicy::Sliding => {
                        if let Some(joined) = in_flight.join_next().await {
                            self.settle(joined, &mut stats, sink);
                        }
                    }
                }
            }

            let Some(slot) = self.state.register(index, &resource.id) else {
                outcome = RunOutcome::Cancelled;
                break;
            };

            let label = display_name(&resource);
            log::debug!("Dispatching {} ({label})", resource.id);
            sink.on_log_line(LineKind::Info, &format!("{label} Downloading"));
            stats.record_dispatch();

            let transfer = Arc::clone(&self.transfer);
            let dest = dest_dir.to_path_buf();
            in_flight.spawn(async move {
                let outcome = transfer.fetch(&resource, &dest, slot.token()).await;
                drop(slot);
                (label, outcome)
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            self.settle(joined, &mut stats, sink);
        }

        if self.state.is_cancelled() {
            outcome = RunOutcome::Cancelled;
            sink.on_log_line(LineKind::Info, "Download cancelled");
        }
        stats.set_peak_active(self.state.snapshot().peak_active);
        Ok(stats.build(outcome))
    }

    /// Accounts for one finished transfer task.
    fn settle(
        &self,
        joined: std::result::Result<(String, TransferOutcome), JoinError>,
        stats: &mut RunStatsBuilder,
        sink: &dyn ProgressSink,
    ) {
        let (label, outcome) = joined.unwrap_or_else(|e| {
            log::error!("Transfer task failed: {e}");
            (
                "transfer".to_string(),
                TransferOutcome::Failed(FailureReason::Io(e.to_string())),
            )
        });

        stats.record(&outcome);
        let snapshot = self.state.record_settled();

        let line = match &outcome {
            TransferOutcome::Completed { .. } => format!("{label} Completed"),
            TransferOutcome::Failed(FailureReason::HttpStatus(code)) => {
                format!("Error: Failed to download {label}. Statuscode is: {code}.")
            }
            TransferOutcome::Failed(FailureReason::Cancelled) => format!("{label} Cancelled"),
            TransferOutcome::Failed(reason) => format!("Error: {label}: {reason}"),
        };
        let kind = LineKind::classify(&line);
        if kind == LineKind::Error {
            log::warn!("{line}");
        }
        sink.on_log_line(kind, &line);
        sink.on_progress(snapshot.ratio());
    }
}

fn display_name(resource: &ResourceRef) -> String {
    file_name_from_url(&resource.url).unwrap_or_else(|| resource.id.clone())
}

fn report_error(sink: &dyn ProgressSink, error: &Error) {
    log::error!("{error}");
    sink.on_log_line(LineKind::Error, &format!("Error: {error}"));
    sink.on_error(&error.to_string());
}
