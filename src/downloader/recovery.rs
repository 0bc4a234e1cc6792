//! Retry countdown, re-extraction and reconciliation of old and new parts.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::retry::{RetryDecision, classify, countdown};
use crate::transfer::StrategySet;
use crate::types::{Job, JobState, Part};

use super::{MediaDownloader, Observer};

impl MediaDownloader {
    /// Recover from `error` raised during `phase`, or hand it back when it is final
    ///
    /// Each round counts down the retry delay (one observer notification per
    /// tick), then re-extracts metadata and reconciles it with the previous parts.
    /// Rounds repeat while re-extraction itself fails with something retryable.
    /// On success the job is back in `phase`.
    pub(super) async fn recover(
        &self,
        job: &mut Job,
        user: Option<&dyn Extractor>,
        mut error: Error,
        phase: JobState,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        loop {
            match classify(&error) {
                RetryDecision::Retry => {}
                RetryDecision::Fatal | RetryDecision::Stop => return Err(error),
            }
            tracing::warn!(
                job = %job.title(),
                phase = %phase,
                error = %error,
                delay = self.config.retry.delay,
                "Recoverable failure, retrying with fresh metadata"
            );

            countdown(&self.config.retry, cancel, |remaining| {
                job.set_retrying(remaining, error.clone());
                observer.notify(job);
            })
            .await?;

            match self.refresh(job, user, cancel, observer).await {
                Ok(()) => break,
                Err(e) => error = e,
            }
        }

        job.set_state(phase);
        observer.notify(job);
        Ok(())
    }

    async fn refresh(
        &self,
        job: &mut Job,
        user: Option<&dyn Extractor>,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        let old = self.populate(job, user, cancel, observer).await?;
        reconcile(job, old, &self.strategies);
        Ok(())
    }
}

/// Carry on-disk progress from `old` parts over to the job's fresh parts
///
/// Each new part takes over the target and progress of the first unclaimed old
/// part it is resumable from. Old parts left unclaimed have their files removed
/// (best-effort) by the strategy that wrote them.
pub(crate) fn reconcile(job: &mut Job, old: Vec<Part>, strategies: &StrategySet) {
    let mut old: Vec<Option<Part>> = old.into_iter().map(Some).collect();

    for (index, part) in job.parts.iter_mut().enumerate() {
        let claimed = old
            .iter_mut()
            .find(|slot| {
                slot.as_ref()
                    .is_some_and(|previous| part.info().resumable_from(previous.info()))
            })
            .and_then(Option::take);
        if let Some(previous) = claimed {
            tracing::debug!(
                part = index,
                downloaded = previous.downloaded(),
                "Re-extracted part resumes previous progress"
            );
            part.inherit(&previous);
        }
    }

    for abandoned in old.into_iter().flatten() {
        if let Some(target) = abandoned.target() {
            tracing::info!(
                target = %target.display(),
                "Removing file of a part that no longer exists"
            );
            strategies.select(abandoned.info().mode).discard(target);
        }
    }
}
