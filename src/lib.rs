//! datahub-dl - bulk downloader for DataHub collections.
//!
//! Lists every resource of a collection through the paginated catalog API,
//! then downloads them into a local directory with a bounded window of
//! concurrent transfers, reporting progress to a [`ProgressSink`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use datahub_dl::{CatalogClient, Coordinator, DownloadConfig, LogSink, RunRequest, Transfer};
//!
//! # async fn example() -> datahub_dl::Result<()> {
//! let http = reqwest::Client::new();
//! let catalog = CatalogClient::new(http.clone(), "https://api.tnris.org");
//! let coordinator = Coordinator::new(catalog, Transfer::new(http), DownloadConfig::default());
//!
//! let request = RunRequest::new("0f8e3c52-7d4a-4c1e-9a2b-5e6f7a8b9c0d")
//!     .with_type_filter("LPC")
//!     .with_dest_dir("./tiles");
//! let report = coordinator.start(request, Arc::new(LogSink)).await?;
//! println!("Downloaded {} of {} resources", report.succeeded, report.total);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod progress;
pub mod state;
pub mod stats;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use catalog::{Catalog, CatalogClient, ResourceRef, ResourceType, group_by_category};
pub use config::{AppConfig, DownloadConfig, WindowPolicy};
pub use coordinator::{Coordinator, Phase, RunRequest};
pub use download::{FailureReason, Transfer, TransferOutcome};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration, format_percent};
pub use fs::{FileSystem, TokioFileSystem};
pub use progress::{LineKind, LogBuffer, LogSink, NoProgress, ProgressSink};
pub use state::ProgressSnapshot;
pub use stats::{RunOutcome, RunReport};
