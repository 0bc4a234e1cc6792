//! Extractor for plain HTTP(S) links to a single media file

use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::Extractor;
use crate::error::ExtractionError;
use crate::types::{Extracted, PartInfo, ResumeMode};

/// Treats the source URL itself as the only part
///
/// A `HEAD` request supplies content type, size and range support. Range-capable
/// servers get [`ResumeMode::Range`], or [`ResumeMode::Segmented`] once the size
/// reaches `segmented_min_size`.
pub struct DirectExtractor {
    client: reqwest::Client,
    segmented_min_size: Option<u64>,
}

impl DirectExtractor {
    /// Create an extractor using `client`
    pub fn new(client: reqwest::Client, segmented_min_size: Option<u64>) -> Self {
        Self {
            client,
            segmented_min_size,
        }
    }

    fn mode(&self, ranges: bool, size: Option<u64>) -> ResumeMode {
        if !ranges {
            return ResumeMode::Single;
        }
        match (size, self.segmented_min_size) {
            (Some(size), Some(min)) if size > 0 && size >= min => ResumeMode::Segmented,
            _ => ResumeMode::Range,
        }
    }
}

/// Title from the last path segment without its extension, or the host
fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        });

    match segment {
        Some(name) => match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        },
        None => url.host_str().unwrap_or_default().to_string(),
    }
}

#[async_trait]
impl Extractor for DirectExtractor {
    fn probe(&self, source: &Url) -> bool {
        matches!(source.scheme(), "http" | "https")
    }

    async fn extract(
        &self,
        source: &Url,
        cancel: &CancellationToken,
        _notify: &(dyn Fn() + Send + Sync),
    ) -> Result<Extracted, ExtractionError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractionError::Interrupted),
            response = self.client.head(source.clone()).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Http {
                status: status.as_u16(),
                url: source.to_string(),
            });
        }

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        // HEAD bodies are empty, so read the declared length from the header itself
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"));

        // Redirects are followed once here so transfers hit the final location
        let url = response.url().clone();
        let mode = self.mode(ranges, size);
        tracing::debug!(
            source = %source,
            content_type = content_type.as_deref().unwrap_or("-"),
            size = ?size,
            mode = ?mode,
            "Probed direct media link"
        );

        Ok(Extracted {
            title: title_from_url(&url),
            parts: vec![PartInfo {
                url,
                content_type,
                size,
                mode,
            }],
        })
    }

    fn name(&self) -> &str {
        "direct"
    }
}
