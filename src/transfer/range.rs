//! Byte-range fetch that continues from the bytes already on disk

use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;

use super::{ProgressSink, Transfer, TransferRequest, check_complete, open_stream, write_body};
use crate::error::TransferError;
use crate::types::PartInfo;
use crate::utils::file_len;

/// Fetches the remainder of a part with `Range: bytes=<offset>-` and appends it
///
/// When the server ignores the range and answers 200, the file is rewritten
/// from the start. A 416 answer for a part of unknown length means every byte is
/// already on disk.
pub struct RangeTransfer {
    client: reqwest::Client,
}

impl RangeTransfer {
    /// Create a strategy using `client`
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transfer for RangeTransfer {
    async fn transfer(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> Result<(), TransferError> {
        let url = &request.info.url;
        let mut offset = request.offset;

        if request.info.size.is_some_and(|size| offset >= size) {
            progress.downloading(offset);
            return check_complete(url, request.info.size, offset);
        }

        let range = (offset > 0).then_some((offset, None));
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Interrupted),
            response = open_stream(&self.client, url, range) => response,
        };
        let response = match response {
            // Nothing left past the verified bytes of a part with unknown length
            Err(TransferError::Http { status: 416, .. })
                if offset > 0 && request.info.size.is_none() =>
            {
                tracing::debug!(
                    part = request.index,
                    bytes = offset,
                    "Range not satisfiable at end of file, part already complete"
                );
                progress.downloading(offset);
                return Ok(());
            }
            response => response?,
        };

        if offset > 0 && response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            tracing::warn!(
                part = request.index,
                status = response.status().as_u16(),
                "Server ignored range request, restarting from the first byte"
            );
            offset = 0;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&request.target)
            .await?;
        // Drop anything past the verified offset before appending
        file.set_len(offset).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        progress.downloading(offset);

        let mut downloaded = offset;
        write_body(response, &mut file, &cancel, |len| {
            downloaded += len;
            progress.downloading(downloaded);
        })
        .await?;

        check_complete(url, request.info.size, downloaded)?;
        tracing::debug!(
            part = request.index,
            resumed_from = request.offset,
            bytes = downloaded,
            "Range transfer finished"
        );
        Ok(())
    }

    /// Any file no longer than the declared size is a valid prefix
    fn can_resume(&self, info: &PartInfo, target: &Path) -> Option<u64> {
        let len = file_len(target)?;
        match info.size {
            Some(size) if len > size => None,
            _ => Some(len),
        }
    }

    fn name(&self) -> &'static str {
        "range"
    }
}
