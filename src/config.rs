//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, segmenting)
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Default target directory for jobs that do not set their own (default: none)
    #[serde(default)]
    pub target_dir: Option<PathBuf>,

    /// Maximum number of parts transferred at the same time (default: 4)
    #[serde(default = "default_max_concurrent_parts")]
    pub max_concurrent_parts: usize,

    /// Segment size in bytes for segmented parts (default: 4 MiB)
    #[serde(default = "default_segment_size")]
    pub segment_size: u64,

    /// Segments fetched at the same time within one segmented part (default: 4)
    #[serde(default = "default_segment_concurrency")]
    pub segment_concurrency: usize,

    /// Parts at least this large are fetched segmented when the server accepts ranges
    /// (None = never segment)
    #[serde(default)]
    pub segmented_min_size: Option<u64>,

    /// User-Agent header sent by the built-in HTTP client
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Content-type prefixes a part must match before it is downloaded
    /// (default: `video/`, `audio/`; empty = accept any type)
    ///
    /// Anything else, typically an HTML error or login page, is treated as stale
    /// metadata and re-extracted.
    #[serde(default = "default_allowed_media_types")]
    pub allowed_media_types: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            target_dir: None,
            max_concurrent_parts: default_max_concurrent_parts(),
            segment_size: default_segment_size(),
            segment_concurrency: default_segment_concurrency(),
            segmented_min_size: None,
            user_agent: default_user_agent(),
            allowed_media_types: default_allowed_media_types(),
        }
    }
}

/// Retry countdown configuration
///
/// A retryable failure waits `delay` ticks of `tick` each (counting down to zero,
/// one observer notification per tick) before metadata is re-extracted.
/// There is no attempt cap: retryable failures are retried until success,
/// a fatal failure, or the stop signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of countdown ticks before a retry (default: 5)
    #[serde(default = "default_retry_delay")]
    pub delay: u32,

    /// Length of one countdown tick (default: 1 second, serialized as milliseconds)
    #[serde(default = "default_retry_tick", with = "duration_millis_serde")]
    pub tick: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: default_retry_delay(),
            tick: default_retry_tick(),
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
///
/// Download settings are flattened so the serialized form stays flat;
/// retry settings live under a `retry` key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry countdown settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Parse a configuration from JSON, then validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::Config {
                message: format!("invalid configuration JSON: {}", e),
                key: None,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this configuration to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config {
            message: format!("failed to serialize configuration: {}", e),
            key: None,
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_parts == 0 {
            return Err(Error::config(
                "max_concurrent_parts must be at least 1",
                "max_concurrent_parts",
            ));
        }
        if self.download.segment_size == 0 {
            return Err(Error::config(
                "segment_size must be greater than zero",
                "segment_size",
            ));
        }
        if self.download.segment_concurrency == 0 {
            return Err(Error::config(
                "segment_concurrency must be at least 1",
                "segment_concurrency",
            ));
        }
        if self.retry.tick.is_zero() {
            return Err(Error::config(
                "retry tick must be greater than zero",
                "retry.tick",
            ));
        }
        Ok(())
    }
}

fn default_max_concurrent_parts() -> usize {
    4
}

fn default_segment_size() -> u64 {
    4 * 1024 * 1024
}

fn default_segment_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    concat!("media-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_allowed_media_types() -> Vec<String> {
    vec!["video/".to_string(), "audio/".to_string()]
}

fn default_retry_delay() -> u32 {
    5
}

fn default_retry_tick() -> Duration {
    Duration::from_secs(1)
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
