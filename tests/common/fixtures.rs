//! Scripted extractor and transfer strategy used to drive the orchestrator

use async_trait::async_trait;
use media_dl::error::{ExtractionError, TransferError};
use media_dl::transfer::{ProgressSink, Transfer, TransferRequest};
use media_dl::types::{Extracted, PartInfo, ResumeMode};
use media_dl::Extractor;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Host accepted by [`ScriptedExtractor::probe`]
pub const MEDIA_HOST: &str = "media.example.com";

/// Bytes served by [`ScriptedTransfer`]; a part of size N receives the first N
pub const CONTENT: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Source URL on [`MEDIA_HOST`]
pub fn source(id: &str) -> Url {
    Url::parse(&format!("https://{}/watch?v={}", MEDIA_HOST, id)).expect("valid source URL")
}

/// A part descriptor served by [`ScriptedTransfer`]
pub fn part(content_type: &str, size: u64, mode: ResumeMode) -> PartInfo {
    let url = format!("https://cdn.example.com/{}?sig={}", content_type, size);
    PartInfo::new(Url::parse(&url).expect("valid part URL"), content_type, Some(size), mode)
}

/// Metadata with the given title and parts
pub fn extracted(title: &str, parts: Vec<PartInfo>) -> Extracted {
    Extracted {
        title: title.to_string(),
        parts,
    }
}

/// Extractor that replays a script of results, repeating the last one forever
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<Extracted, ExtractionError>>>,
    last: Mutex<Option<Result<Extracted, ExtractionError>>>,
    calls: AtomicUsize,
    progress_steps: usize,
}

impl ScriptedExtractor {
    /// Replay `script` in order
    pub fn new(script: Vec<Result<Extracted, ExtractionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            progress_steps: 0,
        }
    }

    /// Call `notify` `steps` times during every extraction
    pub fn with_progress(mut self, steps: usize) -> Self {
        self.progress_steps = steps;
        self
    }

    /// Always return `extracted`
    pub fn always(extracted: Extracted) -> Self {
        Self::new(vec![Ok(extracted)])
    }

    /// Number of `extract` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn probe(&self, source: &Url) -> bool {
        source.host_str() == Some(MEDIA_HOST)
    }

    async fn extract(
        &self,
        _source: &Url,
        cancel: &CancellationToken,
        notify: &(dyn Fn() + Send + Sync),
    ) -> Result<Extracted, ExtractionError> {
        if cancel.is_cancelled() {
            return Err(ExtractionError::Interrupted);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.progress_steps {
            notify();
        }

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(ExtractionError::Malformed("empty script".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// What the next [`ScriptedTransfer::transfer`] call does
#[derive(Debug, Clone)]
pub enum Step {
    /// Write the remaining bytes and succeed
    Complete,
    /// Write up to byte `after` (exclusive), then fail with `error`
    Fail {
        /// Total bytes on disk when the failure is raised
        after: u64,
        /// The failure
        error: TransferError,
    },
    /// Do nothing until cancelled
    Hang,
}

/// One recorded call to [`ScriptedTransfer::transfer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Index of the part within its job
    pub index: usize,
    /// Target file the part was written to
    pub target: PathBuf,
    /// Offset the transfer started from
    pub offset: u64,
}

/// Transfer strategy that writes [`CONTENT`] following a script of steps
///
/// Range semantics: the target is kept up to `offset` and appended to. Calls
/// beyond the script complete normally.
#[derive(Default)]
pub struct ScriptedTransfer {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransfer {
    /// Play `steps` in call order
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    /// Every call so far, in call order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Transfers running right now
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of transfers that ever ran at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(&self.active)
    }
}

async fn write_range(target: &Path, from: u64, to: u64) -> Result<(), TransferError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(target)
        .await?;
    file.set_len(from).await?;
    file.seek(std::io::SeekFrom::Start(from)).await?;
    file.write_all(&CONTENT[from as usize..to as usize]).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl Transfer for ScriptedTransfer {
    async fn transfer(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> Result<(), TransferError> {
        let _active = self.enter();
        self.calls.lock().unwrap().push(Call {
            index: request.index,
            target: request.target.clone(),
            offset: request.offset,
        });
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Complete);
        let size = request.info.size.unwrap_or(CONTENT.len() as u64);

        match step {
            Step::Complete => {
                write_range(&request.target, request.offset, size).await?;
                progress.downloading(size);
                Ok(())
            }
            Step::Fail { after, error } => {
                let after = after.max(request.offset).min(size);
                write_range(&request.target, request.offset, after).await?;
                progress.downloading(after);
                Err(error)
            }
            Step::Hang => {
                cancel.cancelled().await;
                Err(TransferError::Interrupted)
            }
        }
    }

    fn can_resume(&self, info: &PartInfo, target: &Path) -> Option<u64> {
        let len = std::fs::metadata(target).ok()?.len();
        (len <= info.size.unwrap_or(u64::MAX)).then_some(len)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
