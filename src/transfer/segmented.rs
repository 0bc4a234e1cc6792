//! Segmented fetch: the part is split into fixed-size byte ranges fetched
//! concurrently into a preallocated file.
//!
//! Progress is tracked in a JSON sidecar next to the target
//! (`<target>.segments`) recording which segments are on disk. A target can only
//! be resumed when the sidecar matches the declared size and segment size and the
//! file has its full preallocated length. The sidecar is removed once every
//! segment is written.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;

use super::{
    ProgressSink, SingleTransfer, Transfer, TransferRequest, check_complete, open_stream, write_body,
};
use crate::error::{MultipartError, PartOutcome, TransferError};
use crate::types::PartInfo;
use crate::utils::{file_len, remove_file_quietly};

/// Sidecar file suffix
const LAYOUT_SUFFIX: &str = "segments";

/// On-disk record of which segments are complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SegmentLayout {
    size: u64,
    segment_size: u64,
    done: Vec<bool>,
}

impl SegmentLayout {
    fn new(size: u64, segment_size: u64) -> Self {
        let count = size.div_ceil(segment_size) as usize;
        Self {
            size,
            segment_size,
            done: vec![false; count],
        }
    }

    /// Inclusive byte range of segment `index`
    fn bounds(&self, index: usize) -> (u64, u64) {
        let start = index as u64 * self.segment_size;
        let end = (start + self.segment_size).min(self.size) - 1;
        (start, end)
    }

    fn done_bytes(&self) -> u64 {
        self.done
            .iter()
            .enumerate()
            .filter(|(_, done)| **done)
            .map(|(i, _)| {
                let (start, end) = self.bounds(i);
                end - start + 1
            })
            .sum()
    }

    fn pending(&self) -> Vec<usize> {
        self.done
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
            .collect()
    }

    fn matches(&self, size: u64, segment_size: u64) -> bool {
        self.size == size
            && self.segment_size == segment_size
            && self.done.len() == size.div_ceil(segment_size) as usize
    }
}

fn layout_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".");
    name.push(LAYOUT_SUFFIX);
    PathBuf::from(name)
}

fn read_layout(target: &Path) -> Option<SegmentLayout> {
    let raw = std::fs::read(layout_path(target)).ok()?;
    serde_json::from_slice(&raw).ok()
}

async fn write_layout(target: &Path, layout: &SegmentLayout) -> Result<(), TransferError> {
    let raw = serde_json::to_vec(layout).map_err(|e| TransferError::Io {
        kind: std::io::ErrorKind::InvalidData,
        message: e.to_string(),
    })?;
    tokio::fs::write(layout_path(target), raw).await?;
    Ok(())
}

/// Fetches a part as concurrent byte-range segments
pub struct SegmentedTransfer {
    client: reqwest::Client,
    segment_size: u64,
    concurrency: usize,
}

impl SegmentedTransfer {
    /// Create a strategy using `client`
    pub fn new(client: reqwest::Client, segment_size: u64, concurrency: usize) -> Self {
        Self {
            client,
            segment_size: segment_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    fn valid_layout(&self, size: u64, target: &Path) -> Option<SegmentLayout> {
        let layout = read_layout(target)?;
        (layout.matches(size, self.segment_size) && file_len(target)? == size).then_some(layout)
    }

    /// Load a resumable layout or preallocate the target and start a fresh one
    async fn prepare(&self, size: u64, target: &Path) -> Result<SegmentLayout, TransferError> {
        if let Some(layout) = self.valid_layout(size, target) {
            return Ok(layout);
        }
        let file = tokio::fs::File::create(target).await?;
        file.set_len(size).await?;
        let layout = SegmentLayout::new(size, self.segment_size);
        write_layout(target, &layout).await?;
        Ok(layout)
    }

    async fn fetch_segment(
        &self,
        url: &url::Url,
        target: &Path,
        (start, end): (u64, u64),
        cancel: &CancellationToken,
        downloaded: &AtomicU64,
        progress: &ProgressSink,
    ) -> Result<(), TransferError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Interrupted),
            response = open_stream(&self.client, url, Some((start, Some(end)))) => response?,
        };
        if response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            return Err(TransferError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(target)
            .await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let expected = end - start + 1;
        let written = write_body(response, &mut file, cancel, |len| {
            let total = downloaded.fetch_add(len, Ordering::Relaxed) + len;
            progress.downloading(total);
        })
        .await;

        match written {
            Ok(written) => check_complete(url, Some(expected), written),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Transfer for SegmentedTransfer {
    async fn transfer(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> Result<(), TransferError> {
        let Some(size) = request.info.size.filter(|size| *size > 0) else {
            // Without a declared size there is nothing to split
            tracing::debug!(part = request.index, "No declared size, fetching in one piece");
            return SingleTransfer::new(self.client.clone())
                .transfer(request, cancel, progress)
                .await;
        };
        let target = request.target.as_path();
        let url = &request.info.url;

        let mut layout = self.prepare(size, target).await?;
        let downloaded = AtomicU64::new(layout.done_bytes());
        progress.downloading(downloaded.load(Ordering::Relaxed));

        let segments: Vec<(usize, (u64, u64))> = layout
            .pending()
            .into_iter()
            .map(|index| (index, layout.bounds(index)))
            .collect();
        let cancel_ref = &cancel;
        let progress_ref = &progress;
        let downloaded_ref = &downloaded;
        let mut fetches = stream::iter(segments)
            .map(|(index, bounds)| async move {
                let result = self
                    .fetch_segment(url, target, bounds, cancel_ref, downloaded_ref, progress_ref)
                    .await;
                (index, result)
            })
            .buffer_unordered(self.concurrency);

        let mut outcomes = Vec::new();
        while let Some((index, result)) = fetches.next().await {
            if result.is_ok() {
                if let Some(done) = layout.done.get_mut(index) {
                    *done = true;
                }
                // Persist after every segment so an interrupted process resumes here
                write_layout(target, &layout).await?;
            }
            outcomes.push(PartOutcome {
                index,
                target: Some(request.target.clone()),
                error: result.err(),
            });
        }
        drop(fetches);
        outcomes.sort_by_key(|o| o.index);

        if outcomes.iter().any(|o| o.error.is_some()) {
            if cancel.is_cancelled() {
                return Err(TransferError::Interrupted);
            }
            return Err(TransferError::Multipart(MultipartError { outcomes }));
        }

        remove_file_quietly(&layout_path(target));
        tracing::debug!(
            part = request.index,
            segments = layout.done.len(),
            bytes = size,
            "Segmented transfer finished"
        );
        Ok(())
    }

    fn can_resume(&self, info: &PartInfo, target: &Path) -> Option<u64> {
        let size = info.size?;
        self.valid_layout(size, target).map(|layout| layout.done_bytes())
    }

    fn discard(&self, target: &Path) {
        remove_file_quietly(target);
        remove_file_quietly(&layout_path(target));
    }

    fn name(&self) -> &'static str {
        "segmented"
    }
}
