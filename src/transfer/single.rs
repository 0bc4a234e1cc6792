//! Plain sequential fetch: always from byte zero, overwriting the target

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::{ProgressSink, Transfer, TransferRequest, check_complete, open_stream, write_body};
use crate::error::TransferError;
use crate::types::PartInfo;
use crate::utils::file_len;

/// Fetches a part in one GET, truncating whatever is at the target
pub struct SingleTransfer {
    client: reqwest::Client,
}

impl SingleTransfer {
    /// Create a strategy using `client`
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transfer for SingleTransfer {
    async fn transfer(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> Result<(), TransferError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Interrupted),
            response = open_stream(&self.client, &request.info.url, None) => response?,
        };

        let mut file = tokio::fs::File::create(&request.target).await?;
        progress.downloading(0);

        let mut downloaded = 0u64;
        let written = write_body(response, &mut file, &cancel, |len| {
            downloaded += len;
            progress.downloading(downloaded);
        })
        .await?;

        check_complete(&request.info.url, request.info.size, written)?;
        tracing::debug!(part = request.index, bytes = written, "Single transfer finished");
        Ok(())
    }

    /// Only a file that already holds the full declared size is reusable
    fn can_resume(&self, info: &PartInfo, target: &Path) -> Option<u64> {
        let size = info.size?;
        (file_len(target)? == size).then_some(size)
    }

    fn name(&self) -> &'static str {
        "single"
    }
}
