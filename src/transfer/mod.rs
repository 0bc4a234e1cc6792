//! Uniform transfer contract and the per-mode strategy selector
//!
//! Every part is moved to disk by one [`Transfer`] implementation chosen from its
//! [`ResumeMode`]:
//!
//! - [`SingleTransfer`] - plain GET, always from the first byte
//! - [`RangeTransfer`] - `Range` GET continuing from the verified on-disk length
//! - [`SegmentedTransfer`] - concurrent segment GETs tracked by a sidecar layout file
//!
//! Strategies fail fast and never retry; they report progress to the coordinator
//! through a [`ProgressSink`] instead of touching job state.

mod range;
mod segmented;
mod single;

pub use range::RangeTransfer;
pub use segmented::SegmentedTransfer;
pub use single::SingleTransfer;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::error::{Error, Result, TransferError};
use crate::types::{Part, PartInfo, PartState, ResumeMode};
use crate::utils::{file_len, remove_file_quietly};

/// Everything a strategy needs to move one part
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Index of the part within its job
    pub index: usize,
    /// The part descriptor
    pub info: PartInfo,
    /// Where the bytes go
    pub target: PathBuf,
    /// Bytes already verified on disk at `target`
    pub offset: u64,
}

/// Progress notification sent from a worker to the coordinator
#[derive(Debug, Clone)]
pub enum PartUpdate {
    /// Bytes are flowing; `downloaded` is the total now on disk
    Downloading {
        /// Total bytes on disk
        downloaded: u64,
    },
    /// The strategy is waiting before trying again
    Retrying {
        /// Remaining countdown ticks
        delay: u32,
        /// Why it is retrying
        error: TransferError,
    },
}

/// A [`PartUpdate`] tagged with the part it belongs to
#[derive(Debug, Clone)]
pub struct PartProgress {
    /// Index of the part within its job
    pub index: usize,
    /// What happened
    pub update: PartUpdate,
}

/// One-way progress channel from a worker to the coordinator
#[derive(Debug, Clone)]
pub struct ProgressSink {
    index: usize,
    tx: mpsc::UnboundedSender<PartProgress>,
}

impl ProgressSink {
    /// Create a sink for part `index` together with the receiving end
    pub fn channel(index: usize) -> (Self, mpsc::UnboundedReceiver<PartProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { index, tx }, rx)
    }

    pub(crate) fn new(index: usize, tx: mpsc::UnboundedSender<PartProgress>) -> Self {
        Self { index, tx }
    }

    /// Report the total number of bytes now on disk
    pub fn downloading(&self, downloaded: u64) {
        self.send(PartUpdate::Downloading { downloaded });
    }

    /// Report a strategy-level retry countdown
    pub fn retrying(&self, delay: u32, error: TransferError) {
        self.send(PartUpdate::Retrying { delay, error });
    }

    fn send(&self, update: PartUpdate) {
        // The coordinator may already be gone after a stop; progress is then moot.
        self.tx
            .send(PartProgress {
                index: self.index,
                update,
            })
            .ok();
    }
}

/// Uniform contract for moving the bytes of one part to disk
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Transfer the part described by `request`
    ///
    /// Writes to `request.target`, reports progress through `progress`, and
    /// returns [`TransferError::Interrupted`] promptly once `cancel` fires.
    async fn transfer(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> std::result::Result<(), TransferError>;

    /// Bytes at `target` this strategy can continue from, `None` if the file is
    /// not a usable starting point
    fn can_resume(&self, info: &PartInfo, target: &Path) -> Option<u64>;

    /// Remove every on-disk artifact this strategy keeps for `target` (best-effort)
    fn discard(&self, target: &Path) {
        remove_file_quietly(target);
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// The three strategies, keyed by resumability mode
#[derive(Clone)]
pub struct StrategySet {
    single: Arc<dyn Transfer>,
    range: Arc<dyn Transfer>,
    segmented: Arc<dyn Transfer>,
}

impl StrategySet {
    /// Build a set from explicit strategies
    pub fn new(single: Arc<dyn Transfer>, range: Arc<dyn Transfer>, segmented: Arc<dyn Transfer>) -> Self {
        Self {
            single,
            range,
            segmented,
        }
    }

    /// HTTP strategies sharing one client
    pub fn http(client: reqwest::Client, config: &DownloadConfig) -> Self {
        Self {
            single: Arc::new(SingleTransfer::new(client.clone())),
            range: Arc::new(RangeTransfer::new(client.clone())),
            segmented: Arc::new(SegmentedTransfer::new(
                client,
                config.segment_size,
                config.segment_concurrency,
            )),
        }
    }

    /// Replace the strategy for one mode
    pub fn set(&mut self, mode: ResumeMode, strategy: Arc<dyn Transfer>) {
        match mode {
            ResumeMode::Single => self.single = strategy,
            ResumeMode::Range => self.range = strategy,
            ResumeMode::Segmented => self.segmented = strategy,
        }
    }

    /// The strategy bound to a resumability mode
    pub fn select(&self, mode: ResumeMode) -> &Arc<dyn Transfer> {
        match mode {
            ResumeMode::Single => &self.single,
            ResumeMode::Range => &self.range,
            ResumeMode::Segmented => &self.segmented,
        }
    }

    /// Build the request for a resolved part, dropping progress that cannot be trusted
    ///
    /// A finished part keeps its completion only while the file still holds the
    /// recorded bytes. A range part whose on-disk length differs from its recorded
    /// progress starts over, and an unfinished single part always does.
    pub(crate) fn plan(&self, index: usize, part: &mut Part) -> Result<TransferRequest> {
        let target = part
            .target
            .clone()
            .ok_or_else(|| Error::StaleMetadata(format!("part {} has no target file", index)))?;

        if part.state == PartState::Done && file_len(&target) != Some(part.downloaded) {
            tracing::debug!(
                part = index,
                recorded = part.downloaded,
                target = %target.display(),
                "Finished part no longer matches its file, starting over"
            );
            part.reset();
        }

        match part.info().mode {
            ResumeMode::Range => {
                let on_disk = file_len(&target).unwrap_or(0);
                if on_disk != part.downloaded {
                    tracing::debug!(
                        part = index,
                        on_disk,
                        recorded = part.downloaded,
                        target = %target.display(),
                        "On-disk size does not match recorded progress, starting over"
                    );
                    part.reset();
                }
            }
            ResumeMode::Single => {
                if !part.is_complete() {
                    part.downloaded = 0;
                }
            }
            ResumeMode::Segmented => {}
        }

        Ok(TransferRequest {
            index,
            info: part.info().clone(),
            target,
            offset: part.downloaded,
        })
    }
}

/// Issue a GET (optionally ranged) and map failure statuses
pub(crate) async fn open_stream(
    client: &reqwest::Client,
    url: &url::Url,
    range: Option<(u64, Option<u64>)>,
) -> std::result::Result<reqwest::Response, TransferError> {
    let mut request = client.get(url.clone());
    if let Some((start, end)) = range {
        let value = match end {
            Some(end) => format!("bytes={}-{}", start, end),
            None => format!("bytes={}-", start),
        };
        request = request.header(reqwest::header::RANGE, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Err(TransferError::NotFound {
            message: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(TransferError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// Copy a response body into `file`, calling `on_chunk` with each written length
///
/// Returns the number of bytes written. The file is flushed on every exit path
/// so the on-disk length matches what was reported.
pub(crate) async fn write_body<F>(
    mut response: reqwest::Response,
    file: &mut tokio::fs::File,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> std::result::Result<u64, TransferError>
where
    F: FnMut(u64),
{
    let mut written = 0u64;
    let result = loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(TransferError::Interrupted),
            chunk = response.chunk() => chunk,
        };
        match chunk {
            Ok(Some(bytes)) => {
                if let Err(e) = file.write_all(&bytes).await {
                    break Err(e.into());
                }
                written += bytes.len() as u64;
                on_chunk(bytes.len() as u64);
            }
            Ok(None) => break Ok(written),
            Err(e) => break Err(e.into()),
        }
    };

    if let Err(e) = file.flush().await {
        tracing::warn!(error = %e, "Failed to flush part file");
        return Err(result.err().unwrap_or_else(|| e.into()));
    }
    result
}

/// Fail with a transient error when a body ended before its declared size
pub(crate) fn check_complete(
    url: &url::Url,
    expected: Option<u64>,
    actual: u64,
) -> std::result::Result<(), TransferError> {
    match expected {
        Some(expected) if expected != actual => Err(TransferError::Network(format!(
            "{}: expected {} bytes, got {}",
            url, expected, actual
        ))),
        _ => Ok(()),
    }
}
