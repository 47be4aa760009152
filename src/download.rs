//! Transfer of a single resource to local storage.

use std::path::{Path, PathBuf};

use reqwest::Url;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::catalog::ResourceRef;
use crate::fs::{FileSystem, TokioFileSystem};

/// Why a single transfer did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The server answered with a non-success status.
    #[error("Statuscode is: {0}")]
    HttpStatus(u16),
    /// The request could not be sent.
    #[error("Network error: {0}")]
    Network(String),
    /// Creating or writing the destination file failed, or the body stream broke.
    #[error("I/O error: {0}")]
    Io(String),
    /// The transfer was force-closed by cancellation.
    #[error("Cancelled")]
    Cancelled,
    /// The resource URL has no final path segment to use as a file name.
    #[error("URL has no file name")]
    NoFileName,
}

/// Terminal state of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The whole body was written to `path`.
    Completed {
        /// Destination file.
        path: PathBuf,
        /// Number of body bytes written.
        bytes: u64,
    },
    /// The transfer stopped early.
    Failed(FailureReason),
}

impl TransferOutcome {
    /// Returns true for [`TransferOutcome::Completed`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Derives the local file name from the last path segment of `url`.
///
/// `https://host/data/set1/file_42.zip` becomes `file_42.zip`.
#[must_use]
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return None;
    }
    Some(name.to_string())
}

fn io_failure(e: impl std::fmt::Display) -> FailureReason {
    FailureReason::Io(e.to_string())
}

/// Downloads single resources into a directory.
#[derive(Debug, Clone)]
pub struct Transfer<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    fs: F,
}

impl Transfer<TokioFileSystem> {
    /// Creates a transfer unit with the default file system.
    #[must_use]
    pub const fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> Transfer<F> {
    /// Creates a transfer unit with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(http: reqwest::Client, fs: F) -> Self {
        Self { http, fs }
    }

    /// Returns the file system used for destination files.
    #[must_use]
    pub const fn fs(&self) -> &F {
        &self.fs
    }

    /// Downloads `resource` into `dest_dir`.
    ///
    /// The body is streamed to `dest_dir/<file name>`, overwriting any
    /// existing file. `cancel` is checked before the request completes and
    /// at every body chunk; a cancelled transfer may leave a partial file.
    pub async fn fetch(
        &self,
        resource: &ResourceRef,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        match self.try_fetch(resource, dest_dir, cancel).await {
            Ok((path, bytes)) => TransferOutcome::Completed { path, bytes },
            Err(reason) => TransferOutcome::Failed(reason),
        }
    }

    async fn try_fetch(
        &self,
        resource: &ResourceRef,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, u64), FailureReason> {
        let name = file_name_from_url(&resource.url).ok_or(FailureReason::NoFileName)?;

        let mut response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FailureReason::Cancelled),
            res = self.http.get(&resource.url).send() => {
                res.map_err(|e| FailureReason::Network(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FailureReason::HttpStatus(status.as_u16()));
        }

        let path = dest_dir.join(&name);
        let file = self.fs.create_file(&path).await.map_err(io_failure)?;
        let mut writer = BufWriter::new(file);
        let mut bytes = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FailureReason::Cancelled),
                chunk = response.chunk() => chunk.map_err(io_failure)?,
            };
            let Some(chunk) = chunk else { break };
            writer.write_all(&chunk).await.map_err(io_failure)?;
            bytes += chunk.len() as u64;
        }

        writer.flush().await.map_err(io_failure)?;
        log::debug!("Wrote {bytes} bytes to {}", path.display());
        Ok((path, bytes))
    }
}
