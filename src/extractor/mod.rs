//! Pluggable metadata extraction
//!
//! An [`Extractor`] turns a source URL into a title and an ordered list of
//! [`PartInfo`](crate::types::PartInfo) descriptors. The [`ExtractorRegistry`]
//! keeps extractors in registration order and dispatches to the first one whose
//! [`Extractor::probe`] accepts the source.

mod direct;

pub use direct::DirectExtractor;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, ExtractionError, Result};
use crate::types::Extracted;

/// Site-specific metadata extractor
///
/// Implementations fail fast: they never retry on their own and should return
/// [`ExtractionError::Interrupted`] once `cancel` fires. The orchestrator decides
/// whether a failure is worth another attempt.
///
/// Extractors that need several requests can call `notify` between them; each
/// call re-publishes the job to the caller's observer.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use media_dl::error::ExtractionError;
/// use media_dl::extractor::Extractor;
/// use media_dl::types::{Extracted, PartInfo, ResumeMode};
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
///
/// struct Fixed;
///
/// #[async_trait]
/// impl Extractor for Fixed {
///     fn probe(&self, source: &Url) -> bool {
///         source.host_str() == Some("media.example.com")
///     }
///
///     async fn extract(
///         &self,
///         source: &Url,
///         _cancel: &CancellationToken,
///         notify: &(dyn Fn() + Send + Sync),
///     ) -> Result<Extracted, ExtractionError> {
///         notify();
///         Ok(Extracted {
///             title: "Clip".to_string(),
///             parts: vec![PartInfo::new(source.clone(), "video/mp4", None, ResumeMode::Single)],
///         })
///     }
///
///     fn name(&self) -> &str {
///         "fixed"
///     }
/// }
/// ```
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Whether this extractor can handle `source`
    fn probe(&self, source: &Url) -> bool;

    /// Fetch title and part descriptors for `source`
    async fn extract(
        &self,
        source: &Url,
        cancel: &CancellationToken,
        notify: &(dyn Fn() + Send + Sync),
    ) -> std::result::Result<Extracted, ExtractionError>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Ordered set of extractors, first match wins
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extractor; earlier registrations take precedence
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// The first extractor whose probe accepts `source`
    pub fn select(&self, source: &Url) -> Result<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.probe(source))
            .map(|e| e.as_ref())
            .ok_or_else(|| Error::UnsupportedSource(source.to_string()))
    }

    /// Number of registered extractors
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// Whether no extractor is registered
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
