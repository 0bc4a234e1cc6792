//! Failure classification and the retry countdown
//!
//! Components never retry on their own: they fail fast and the orchestrator asks
//! [`classify`] what to do. The decision is a pure function of the failure:
//!
//! | Failure | Decision |
//! |---|---|
//! | stop signal anywhere (even nested in a multipart failure) | [`RetryDecision::Stop`] |
//! | transient I/O or network failure | [`RetryDecision::Retry`] |
//! | HTTP 403 / 416 (usually an expired signed URL) | [`RetryDecision::Retry`] |
//! | any other HTTP status, or a single missing resource | [`RetryDecision::Fatal`] |
//! | multipart failure whose failed entries share one not-found message | [`RetryDecision::Fatal`] |
//! | any other multipart failure | [`RetryDecision::Retry`] |
//! | stale metadata, malformed extractor output | [`RetryDecision::Retry`] |
//! | configuration error, unsupported source | [`RetryDecision::Fatal`] |
//!
//! # Example
//!
//! ```
//! use media_dl::error::{Error, TransferError};
//! use media_dl::retry::{RetryDecision, classify};
//!
//! let expired = Error::Transfer(TransferError::Http { status: 403, url: "https://cdn/v".into() });
//! assert_eq!(classify(&expired), RetryDecision::Retry);
//!
//! let broken = Error::Transfer(TransferError::Http { status: 500, url: "https://cdn/v".into() });
//! assert_eq!(classify(&broken), RetryDecision::Fatal);
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ExtractionError, Result, TransferError};
use tokio_util::sync::CancellationToken;

/// HTTP 403 Forbidden
const HTTP_FORBIDDEN: u16 = 403;
/// HTTP 416 Range Not Satisfiable
const HTTP_RANGE_NOT_SATISFIABLE: u16 = 416;

/// What the orchestrator does with a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait out the countdown, re-extract, and try the phase again
    Retry,
    /// Give up: the job ends in the error state
    Fatal,
    /// The stop signal was observed: the job ends in the stop state
    Stop,
}

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, resets, expired URLs) return `true`.
/// Permanent failures (missing resources, server errors, bad configuration)
/// and stop signals return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        transfer_decision(self) == RetryDecision::Retry
    }
}

impl IsRetryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        extraction_decision(self) == RetryDecision::Retry
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        classify(self) == RetryDecision::Retry
    }
}

/// Classify a failure raised during extraction or transfer
///
/// The stop signal always wins over any other classification.
pub fn classify(error: &Error) -> RetryDecision {
    if error.is_interrupted() {
        return RetryDecision::Stop;
    }
    match error {
        Error::Interrupted(_) => RetryDecision::Stop,
        Error::Config { .. } | Error::UnsupportedSource(_) => RetryDecision::Fatal,
        Error::StaleMetadata(_) => RetryDecision::Retry,
        Error::Extraction(e) => extraction_decision(e),
        Error::Transfer(e) => transfer_decision(e),
    }
}

fn status_decision(status: u16) -> RetryDecision {
    match status {
        HTTP_FORBIDDEN | HTTP_RANGE_NOT_SATISFIABLE => RetryDecision::Retry,
        _ => RetryDecision::Fatal,
    }
}

fn extraction_decision(error: &ExtractionError) -> RetryDecision {
    match error {
        ExtractionError::Interrupted => RetryDecision::Stop,
        ExtractionError::Network(_) | ExtractionError::Malformed(_) => RetryDecision::Retry,
        ExtractionError::Http { status, .. } => status_decision(*status),
    }
}

fn transfer_decision(error: &TransferError) -> RetryDecision {
    if error.is_interrupted() {
        return RetryDecision::Stop;
    }
    match error {
        TransferError::Interrupted => RetryDecision::Stop,
        TransferError::Io { .. } | TransferError::Network(_) => RetryDecision::Retry,
        TransferError::Http { status, .. } => status_decision(*status),
        TransferError::NotFound { .. } => RetryDecision::Fatal,
        TransferError::Multipart(m) => {
            // The whole asset is gone upstream only if every failure agrees on it
            if m.common_not_found().is_some() {
                RetryDecision::Fatal
            } else {
                RetryDecision::Retry
            }
        }
    }
}

/// Fail with [`Error::Interrupted`] if the stop signal is set
pub fn check_stop(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Interrupted("stop".to_string()));
    }
    Ok(())
}

/// Count down the retry delay, one tick at a time
///
/// Calls `on_tick` with the remaining tick count (from `config.delay` down to 0),
/// then waits one tick. The stop signal is checked before each notification and
/// raced against every wait, so a stop is observed within the current tick.
pub async fn countdown<F>(config: &RetryConfig, cancel: &CancellationToken, mut on_tick: F) -> Result<()>
where
    F: FnMut(u32),
{
    for remaining in (0..=config.delay).rev() {
        check_stop(cancel)?;
        on_tick(remaining);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Interrupted("stop".to_string()));
            }
            _ = tokio::time::sleep(config.tick) => {}
        }
    }
    Ok(())
}
