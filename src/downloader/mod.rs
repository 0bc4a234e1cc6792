//! Download orchestration split into focused submodules.
//!
//! The [`MediaDownloader`] drives a [`Job`] through its lifecycle:
//! - [`extract`] - extractor dispatch and job population
//! - [`attempt`] - one download attempt: content check, target resolution, worker pool
//! - [`recovery`] - retry countdown, re-extraction and old/new part reconciliation
//!
//! The coordinating task is the only writer of job and part state. Workers report
//! through a channel and the observer is called synchronously after each change.

mod attempt;
mod extract;
mod recovery;


use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::{DirectExtractor, Extractor, ExtractorRegistry};
use crate::pool::WorkerPool;
use crate::retry::{RetryDecision, check_stop, classify};
use crate::transfer::{StrategySet, Transfer};
use crate::types::{Job, JobState, ResumeMode};

/// Receives a snapshot of the job after every job or part state change
///
/// Called synchronously on the coordinating task, so it must be cheap. Any
/// `Fn(&Job) + Send + Sync` closure is an observer.
pub trait Observer: Send + Sync {
    /// The job changed
    fn notify(&self, job: &Job);
}

impl<F> Observer for F
where
    F: Fn(&Job) + Send + Sync,
{
    fn notify(&self, job: &Job) {
        self(job)
    }
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn notify(&self, _job: &Job) {}
}

/// Download orchestrator (cloneable - all shared parts are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across clones)
    pub(crate) config: Arc<Config>,
    /// Extractors in dispatch order
    pub(crate) extractors: ExtractorRegistry,
    /// Transfer strategy per resumability mode
    pub(crate) strategies: StrategySet,
    /// Bounded pool running part transfers
    pub(crate) pool: WorkerPool,
}

/// Builder for [`MediaDownloader`]
///
/// Extractors added with [`extractor`](Self::extractor) are probed in the order
/// they were added; the [`DirectExtractor`] is appended last unless disabled.
pub struct MediaDownloaderBuilder {
    config: Config,
    client: Option<reqwest::Client>,
    extractors: Vec<Arc<dyn Extractor>>,
    transfers: Vec<(ResumeMode, Arc<dyn Transfer>)>,
    direct: bool,
}

impl MediaDownloaderBuilder {
    /// Register a site-specific extractor
    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Replace the transfer strategy used for one resumability mode
    pub fn transfer(mut self, mode: ResumeMode, strategy: Arc<dyn Transfer>) -> Self {
        self.transfers.push((mode, strategy));
        self
    }

    /// Use a preconfigured HTTP client instead of building one from the config
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Do not fall back to the [`DirectExtractor`] for plain HTTP(S) links
    pub fn without_direct_extractor(mut self) -> Self {
        self.direct = false;
        self
    }

    /// Validate the configuration and assemble the downloader
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration or when the HTTP
    /// client cannot be built.
    pub fn build(self) -> Result<MediaDownloader> {
        self.config.validate()?;

        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(self.config.download.user_agent.as_str())
                .build()
                .map_err(|e| {
                    Error::config(format!("failed to build HTTP client: {}", e), "user_agent")
                })?,
        };

        let mut extractors = ExtractorRegistry::new();
        for extractor in self.extractors {
            extractors.register(extractor);
        }
        if self.direct {
            extractors.register(Arc::new(DirectExtractor::new(
                client.clone(),
                self.config.download.segmented_min_size,
            )));
        }

        let mut strategies = StrategySet::http(client, &self.config.download);
        for (mode, strategy) in self.transfers {
            strategies.set(mode, strategy);
        }

        tracing::debug!(
            extractors = extractors.len(),
            max_concurrent_parts = self.config.download.max_concurrent_parts,
            "Media downloader ready"
        );

        Ok(MediaDownloader {
            pool: WorkerPool::new(self.config.download.max_concurrent_parts),
            config: Arc::new(self.config),
            extractors,
            strategies,
        })
    }
}

impl MediaDownloader {
    /// Start building a downloader for `config`
    pub fn builder(config: Config) -> MediaDownloaderBuilder {
        MediaDownloaderBuilder {
            config,
            client: None,
            extractors: Vec::new(),
            transfers: Vec::new(),
            direct: true,
        }
    }

    /// Downloader with the default extractor and HTTP strategies
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Download every part of `job`, extracting metadata first when the job is empty
    ///
    /// Recoverable failures are retried indefinitely with a countdown and fresh
    /// metadata; wrap the call in a timeout to bound it. On success the job ends in
    /// [`JobState::Done`].
    ///
    /// # Errors
    ///
    /// Returns the fatal failure (job state [`JobState::Error`]) or
    /// [`Error::Interrupted`] once `cancel` fires (job state [`JobState::Stop`]).
    /// Every worker has exited by the time this returns.
    pub async fn download(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        let result = self.run_download(job, None, cancel, observer).await;
        self.settle(job, result, observer)
    }

    /// Like [`download`](Self::download), but metadata always comes from `extractor`
    pub async fn download_with(
        &self,
        job: &mut Job,
        extractor: &dyn Extractor,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        let result = self.run_download(job, Some(extractor), cancel, observer).await;
        self.settle(job, result, observer)
    }

    async fn run_download(
        &self,
        job: &mut Job,
        user: Option<&dyn Extractor>,
        cancel: &CancellationToken,
        observer: &dyn Observer,
    ) -> Result<()> {
        if job.is_empty() {
            self.run_extract(job, user, cancel, observer).await?;
        }

        loop {
            check_stop(cancel)?;
            match self.attempt(job, cancel, observer).await {
                Ok(()) => break,
                Err(e) => {
                    self.recover(job, user, e, JobState::Downloading, cancel, observer)
                        .await?
                }
            }
        }

        tracing::info!(
            job = %job.title(),
            parts = job.parts().len(),
            bytes = job.downloaded(),
            "Download complete"
        );
        job.set_state(JobState::Done);
        observer.notify(job);
        Ok(())
    }

    /// Record a failure that ended the job and tell the observer about it
    fn settle(&self, job: &mut Job, result: Result<()>, observer: &dyn Observer) -> Result<()> {
        let Err(error) = result else {
            return Ok(());
        };

        let state = match classify(&error) {
            RetryDecision::Stop => {
                tracing::info!(job = %job.title(), state = %job.state(), "Job stopped");
                JobState::Stop
            }
            _ => {
                tracing::error!(job = %job.title(), error = %error, "Job failed");
                JobState::Error
            }
        };
        job.set_failed(state, error.clone());
        observer.notify(job);
        Err(error)
    }
}
