//! One download attempt: content check, target resolution, planning, and the
//! worker pool run with progress relayed back onto the job.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, MultipartError, PartOutcome, Result, TransferError};
use crate::resolver::{check_content_types, resolve_targets};
use crate::transfer::{PartProgress, PartUpdate, ProgressSink};
use crate::types::{Job, JobState, PartState};

use super::{MediaDownloader, Observer};

impl MediaDownloader {
    /// Transfer every unfinished part once
    ///
    /// Parts whose recorded progress already covers their declared size are marked
    /// done without being submitted. A single-part job fails with that part's
    /// transfer error; a multi-part job fails with a [`MultipartError`] listing
    /// every submitted part.
    pub(super) async fn attempt(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        check_content_types(job, &self.config.download.allowed_media_types)?;
        resolve_targets(
            job,
            self.config.download.target_dir.as_deref(),
            &self.strategies,
        )?;

        let mut requests = Vec::with_capacity(job.parts.len());
        for (index, part) in job.parts.iter_mut().enumerate() {
            let request = self.strategies.plan(index, part)?;
            if part.is_complete() {
                tracing::debug!(part = index, "Part already complete, skipping");
                part.state = PartState::Done;
                continue;
            }
            part.state = PartState::Idle;
            part.error = None;
            part.delay = 0;
            requests.push(request);
        }

        job.set_state(JobState::Downloading);
        observer.notify(job);
        if requests.is_empty() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<PartProgress>();
        let planned: Vec<usize> = requests.iter().map(|r| r.index).collect();
        let tasks: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let strategy = Arc::clone(self.strategies.select(request.info.mode));
                let sink = ProgressSink::new(request.index, tx.clone());
                move |worker: CancellationToken| async move {
                    tracing::debug!(
                        part = request.index,
                        strategy = strategy.name(),
                        offset = request.offset,
                        target = %request.target.display(),
                        "Part transfer started"
                    );
                    strategy.transfer(request, worker, sink).await
                }
            })
            .collect();

        let run = self.pool.run(tasks, cancel);
        tokio::pin!(run);
        // `tx` stays alive until the pool returns, so `recv` never yields `None` here
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Some(progress) = rx.recv() => {
                    apply_progress(job, progress);
                    observer.notify(job);
                }
            }
        };
        drop(tx);
        // Late progress is applied without notifying: after a stop the next
        // notification must be the terminal one
        while let Ok(progress) = rx.try_recv() {
            apply_progress(job, progress);
        }
        let results = outcome?;

        let mut outcomes = Vec::with_capacity(planned.len());
        for (index, result) in planned.into_iter().zip(results) {
            let Some(part) = job.parts.get_mut(index) else {
                continue;
            };
            match &result {
                Ok(()) => {
                    part.state = PartState::Done;
                    part.error = None;
                    part.delay = 0;
                    if let Some(size) = part.info().size {
                        part.downloaded = size;
                    }
                    tracing::debug!(part = index, bytes = part.downloaded, "Part finished");
                }
                Err(e) => {
                    part.state = PartState::Error;
                    part.error = Some(e.clone());
                    tracing::warn!(part = index, error = %e, "Part failed");
                }
            }
            outcomes.push(PartOutcome {
                index,
                target: part.target.clone(),
                error: result.err(),
            });
        }
        observer.notify(job);

        if outcomes.iter().all(|o| o.error.is_none()) {
            return Ok(());
        }
        if job.parts.len() == 1
            && let Some(error) = outcomes.iter().find_map(|o| o.error.clone())
        {
            return Err(Error::Transfer(error));
        }
        Err(Error::Transfer(TransferError::Multipart(MultipartError {
            outcomes,
        })))
    }
}

/// Record a worker's progress report on its part
///
/// A part-level retry countdown is mirrored on the job, which returns to
/// `Downloading` once no part is counting down anymore.
pub(crate) fn apply_progress(job: &mut Job, progress: PartProgress) {
    let Some(part) = job.parts.get_mut(progress.index) else {
        return;
    };
    match progress.update {
        PartUpdate::Downloading { downloaded } => {
            part.state = PartState::Downloading;
            part.downloaded = downloaded;
            part.delay = 0;
            if job.state == JobState::Retrying
                && !job.parts.iter().any(|p| p.state == PartState::Retrying)
            {
                job.set_state(JobState::Downloading);
            }
        }
        PartUpdate::Retrying { delay, error } => {
            part.state = PartState::Retrying;
            part.delay = delay;
            part.error = Some(error.clone());
            job.set_retrying(delay, Error::Transfer(error));
        }
    }
}
