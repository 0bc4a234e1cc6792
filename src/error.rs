//! Error types for media-dl
//!
//! This module provides the error taxonomy used by the orchestration engine:
//! - [`Error`] - top-level failures surfaced to the caller
//! - [`ExtractionError`] - failures raised while fetching metadata for a job
//! - [`TransferError`] - failures raised while moving the bytes of a part
//! - [`MultipartError`] - per-part (or per-segment) outcomes of a multi-stream failure
//!
//! Every type here is `Clone` so the last failure can be kept on the job for
//! observers while the same failure is still returned to the caller.
//! Retry decisions are made in [`crate::retry`], never by the component that failed.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "target_dir")
        key: Option<String>,
    },

    /// No registered extractor accepts the source
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    /// Metadata is inconsistent with what a download needs and must be re-extracted
    #[error("stale metadata: {0}")]
    StaleMetadata(String),

    /// Metadata extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Part transfer failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// The stop signal was observed
    #[error("interrupted: {0}")]
    Interrupted(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error represents an observed stop signal
    pub fn is_interrupted(&self) -> bool {
        match self {
            Error::Interrupted(_) => true,
            Error::Extraction(e) => matches!(e, ExtractionError::Interrupted),
            Error::Transfer(e) => e.is_interrupted(),
            _ => false,
        }
    }
}

/// Metadata extraction errors
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// Connection-level failure (reset, timeout, DNS)
    #[error("network error: {0}")]
    Network(String),

    /// The metadata endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// The response could not be understood
    #[error("malformed metadata: {0}")]
    Malformed(String),

    /// The stop signal was observed during extraction
    #[error("extraction interrupted")]
    Interrupted,
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ExtractionError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => ExtractionError::Network(e.to_string()),
        }
    }
}

/// Part transfer errors
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Local or socket I/O failure
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// The I/O error kind
        kind: std::io::ErrorKind,
        /// The I/O error message
        message: String,
    },

    /// Connection-level failure (reset, timeout, body decode)
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// The resource does not exist upstream
    #[error("not found: {message}")]
    NotFound {
        /// Description of the missing resource, compared verbatim across parts
        message: String,
    },

    /// Several parts (or segments of one part) failed together
    #[error("{0}")]
    Multipart(MultipartError),

    /// The stop signal was observed during the transfer
    #[error("transfer interrupted")]
    Interrupted,
}

impl TransferError {
    /// Whether this error (or any nested part outcome) represents an observed stop signal
    pub fn is_interrupted(&self) -> bool {
        match self {
            TransferError::Interrupted => true,
            TransferError::Multipart(m) => m
                .outcomes
                .iter()
                .flat_map(|o| o.error.as_ref())
                .any(TransferError::is_interrupted),
            _ => false,
        }
    }

    /// The "resource not found" message at the root of this failure, if any
    ///
    /// A multipart failure only has a not-found root when every failed entry shares
    /// the same not-found message.
    pub fn not_found_message(&self) -> Option<&str> {
        match self {
            TransferError::NotFound { message } => Some(message),
            TransferError::Multipart(m) => m.common_not_found(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => TransferError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => TransferError::Network(e.to_string()),
        }
    }
}

/// Outcome of one entry (part or segment) of a multipart failure
#[derive(Debug, Clone)]
pub struct PartOutcome {
    /// Index of the part or segment
    pub index: usize,
    /// Target file of the entry, when known
    pub target: Option<PathBuf>,
    /// The failure, `None` when the entry completed
    pub error: Option<TransferError>,
}

/// Aggregate failure of a multi-stream transfer
#[derive(Debug, Clone)]
pub struct MultipartError {
    /// One entry per part or segment that took part in the attempt
    pub outcomes: Vec<PartOutcome>,
}

impl MultipartError {
    /// Failed entries only
    pub fn failures(&self) -> impl Iterator<Item = &TransferError> {
        self.outcomes.iter().filter_map(|o| o.error.as_ref())
    }

    /// The not-found message shared by every failed entry
    ///
    /// Returns `None` when there are no failures, when any failure has a different
    /// root cause, or when two not-found messages differ.
    pub fn common_not_found(&self) -> Option<&str> {
        let mut common: Option<&str> = None;
        for failure in self.failures() {
            let message = failure.not_found_message()?;
            match common {
                None => common = Some(message),
                Some(seen) if seen == message => {}
                Some(_) => return None,
            }
        }
        common
    }
}

impl std::fmt::Display for MultipartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failed = self.failures().count();
        write!(f, "{} of {} parts failed", failed, self.outcomes.len())?;
        if let Some(first) = self.failures().next() {
            write!(f, " (first: {})", first)?;
        }
        Ok(())
    }
}
