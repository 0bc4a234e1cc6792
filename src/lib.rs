//! # media-dl
//!
//! Resumable, retrying download orchestration for media delivered as one or more
//! independent file parts (for example separate audio and video streams).
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Pluggable** - site-specific extractors and per-mode transfer strategies are traits
//! - **Resumable** - completed bytes are never fetched twice when the server allows it
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Observable** - an observer sees every job and part state change
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, Job, MediaDownloader};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.target_dir = Some("downloads".into());
//!
//!     let downloader = MediaDownloader::new(config)?;
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(media_dl::cancel_on_signal(cancel.clone()));
//!
//!     let mut job = Job::new("https://cdn.example.com/media/Trailer.mp4".parse()?);
//!     downloader
//!         .download(&mut job, &cancel, &|job: &Job| {
//!             println!("{}: {}/{:?} bytes", job.state(), job.downloaded(), job.size());
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download orchestration (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Metadata extractors and extractor dispatch
pub mod extractor;
/// Bounded worker pool
pub mod pool;
/// Target file naming
mod resolver;
/// Failure classification and retry countdown
pub mod retry;
/// Transfer strategies
pub mod transfer;
/// Core types: jobs, parts and their states
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, RetryConfig};
pub use downloader::{MediaDownloader, MediaDownloaderBuilder, NoopObserver, Observer};
pub use error::{Error, ExtractionError, MultipartError, PartOutcome, Result, TransferError};
pub use extractor::{DirectExtractor, Extractor, ExtractorRegistry};
pub use pool::WorkerPool;
pub use retry::{IsRetryable, RetryDecision, classify};
pub use transfer::{
    PartProgress, PartUpdate, ProgressSink, RangeTransfer, SegmentedTransfer, SingleTransfer,
    StrategySet, Transfer, TransferRequest,
};
pub use types::{Extracted, Job, JobState, Part, PartInfo, PartState, ResumeMode};

/// Cancel `cancel` when the process receives a termination signal
///
/// - **Unix:** SIGTERM or SIGINT.
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Every download watching the token then stops and tears down its workers.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let cancel = CancellationToken::new();
/// tokio::spawn(media_dl::cancel_on_signal(cancel.clone()));
/// # }
/// ```
pub async fn cancel_on_signal(cancel: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => cancel.cancel(),
        _ = cancel.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, stopping downloads"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, stopping downloads"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register every signal handler");
            only.recv().await;
            tracing::info!("Received termination signal, stopping downloads");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, stopping downloads"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
