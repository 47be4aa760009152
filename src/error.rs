//! Error types for the datahub-dl library.

use thiserror::Error;

use crate::catalog::ResourceRef;
use crate::coordinator::Phase;

/// Errors that can occur while listing or starting a download run.
///
/// Failures of a single transfer are reported as
/// [`FailureReason`](crate::download::FailureReason) instead, so that one bad
/// resource never aborts the rest of a run.
#[derive(Error, Debug)]
pub enum Error {
    /// The collection identifier is not a valid UUID.
    #[error("Collection ID is invalid: {0:?}")]
    InvalidCollectionId(String),

    /// No destination directory was supplied.
    #[error("No directory has been chosen")]
    MissingDestination,

    /// A run was requested while the coordinator was not idle.
    #[error("A download run is already {0}")]
    Busy(Phase),

    /// The request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A catalog page was not valid JSON of the expected shape.
    #[error("Malformed catalog page: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("HTTP status {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server.
        status: u16,
        /// URL that was requested.
        url: String,
    },

    /// A catalog or cursor URL could not be parsed.
    #[error("Invalid URL {0:?}")]
    InvalidUrl(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pagination failed part-way through.
    ///
    /// `partial` holds every resource decoded before the failing page.
    #[error("Catalog listing failed after {} resource(s): {source}", .partial.len())]
    Listing {
        /// Resources decoded from the pages that did succeed.
        partial: Vec<ResourceRef>,
        /// The underlying network, status or decode failure.
        source: Box<Error>,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for errors raised before a run enters `Running`.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidCollectionId(_) | Self::MissingDestination)
    }

    /// Returns true when the root cause is a transport failure.
    #[must_use]
    pub fn is_network(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpStatus { .. } => true,
            Self::Listing { source, .. } => source.is_network(),
            _ => false,
        }
    }

    /// Returns true when the root cause is a malformed catalog page.
    #[must_use]
    pub fn is_decode(&self) -> bool {
        match self {
            Self::Decode(_) => true,
            Self::Listing { source, .. } => source.is_decode(),
            _ => false,
        }
    }
}

/// A specialized `Result` type for datahub-dl operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_error() -> Error {
        Error::Decode(serde_json::from_str::<serde_json::Value>("{not json").unwrap_err())
    }

    #[test]
    fn validation_errors_are_classified() {
        assert!(Error::MissingDestination.is_validation());
        assert!(Error::InvalidCollectionId("abc".into()).is_validation());
        assert!(!decode_error().is_validation());
    }

    #[test]
    fn listing_error_keeps_root_cause() {
        let err = Error::Listing {
            partial: vec![ResourceRef::new("a", "https://host/a.zip")],
            source: Box::new(decode_error()),
        };
        assert!(err.is_decode());
        assert!(!err.is_network());
        assert!(err.to_string().starts_with("Catalog listing failed after 1 resource(s)"));
    }

    #[test]
    fn http_status_counts_as_network() {
        let err = Error::HttpStatus {
            status: 502,
            url: "https://host/api".into(),
        };
        assert!(err.is_network());
        assert_eq!(err.to_string(), "HTTP status 502 from https://host/api");
    }
}
