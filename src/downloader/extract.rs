//! Extractor dispatch and job population.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, ExtractionError, Result};
use crate::extractor::Extractor;
use crate::retry::check_stop;
use crate::types::{Job, JobState, Part};

use super::{MediaDownloader, Observer};

impl MediaDownloader {
    /// Populate an empty job with title and parts from the first matching extractor
    ///
    /// A job that already has parts is left untouched. Recoverable failures are
    /// retried the same way as during [`download`](Self::download). On success the
    /// job is in [`JobState::ExtractingDone`].
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedSource`] when no extractor accepts the source, any
    /// other fatal failure, or [`Error::Interrupted`] once `cancel` fires.
    pub async fn extract(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        let result = self.run_extract(job, None, cancel, observer).await;
        self.settle(job, result, observer)
    }

    /// Like [`extract`](Self::extract), but always uses `extractor` without probing
    pub async fn extract_with(
        &self,
        job: &mut Job,
        extractor: &dyn Extractor,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        let result = self.run_extract(job, Some(extractor), cancel, observer).await;
        self.settle(job, result, observer)
    }

    pub(super) async fn run_extract(
        &self,
        job: &mut Job,
        user: Option<&dyn Extractor>,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        if !job.is_empty() {
            tracing::debug!(source = %job.source(), "Job already extracted, nothing to do");
            return Ok(());
        }
        check_stop(cancel)?;

        job.set_state(JobState::Extracting);
        observer.notify(job);

        if let Err(e) = self.populate(job, user, cancel, observer).await {
            // Recovery re-extracts until the job is populated or the failure is final
            self.recover(job, user, e, JobState::Extracting, cancel, observer)
                .await?;
        }

        tracing::info!(
            job = %job.title(),
            parts = job.parts().len(),
            "Metadata extracted"
        );
        job.set_state(JobState::ExtractingDone);
        observer.notify(job);
        Ok(())
    }

    /// Replace the job's metadata with a fresh extraction, returning the old parts
    ///
    /// The extractor's notify callback re-publishes the job, unchanged, to `observer`.
    pub(super) async fn populate(
        &self,
        job: &mut Job,
        user: Option<&dyn Extractor>,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<Vec<Part>> {
        let extractor = match user {
            Some(extractor) => extractor,
            None => self.extractors.select(job.source())?,
        };
        tracing::debug!(
            source = %job.source(),
            extractor = extractor.name(),
            "Extracting metadata"
        );

        let current: &Job = job;
        let notify = || observer.notify(current);
        let extracted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Interrupted("stop".to_string())),
            extracted = extractor.extract(current.source(), cancel, &notify) => extracted?,
        };
        if extracted.parts.is_empty() {
            return Err(ExtractionError::Malformed(format!(
                "{} returned no parts for {}",
                extractor.name(),
                job.source()
            ))
            .into());
        }

        Ok(job.replace_parts(extracted))
    }
}
