//! Core types for media-dl: the job, its parts, and their lifecycle states

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, TransferError};

/// Job lifecycle state
///
/// `Retrying` is entered from `Extracting` or `Downloading` and returns to the
/// phase that requested it. `Done`, `Error` and `Stop` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, nothing fetched yet
    New,
    /// Metadata extraction in progress
    Extracting,
    /// Metadata extracted, parts populated
    ExtractingDone,
    /// Part transfers in progress
    Downloading,
    /// Waiting out a retry countdown or re-extracting after a recoverable failure
    Retrying,
    /// Every part finished
    Done,
    /// Fatal failure
    Error,
    /// Stop signal observed
    Stop,
}

impl JobState {
    /// Whether the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Stop)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::New => "new",
            JobState::Extracting => "extracting",
            JobState::ExtractingDone => "extracting_done",
            JobState::Downloading => "downloading",
            JobState::Retrying => "retrying",
            JobState::Done => "done",
            JobState::Error => "error",
            JobState::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Per-part transfer state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartState {
    /// Not started in the current attempt
    #[default]
    Idle,
    /// Bytes are flowing
    Downloading,
    /// The transfer strategy reported a retry countdown
    Retrying,
    /// Finished
    Done,
    /// Failed in the last attempt
    Error,
}

/// How a part's transfer can recover from interruption
///
/// The mode is fixed when the part is created and decides which transfer
/// strategy handles it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Plain sequential fetch, always from the first byte
    #[default]
    Single,
    /// Byte-range fetch that continues from the bytes already on disk
    Range,
    /// Fetch split into segments tracked by an on-disk layout
    Segmented,
}

/// Descriptor of one fetchable stream, as produced by an extractor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// Where the bytes come from
    pub url: Url,
    /// MIME content type (e.g. "video/mp4"), `None` when the extractor could not tell
    pub content_type: Option<String>,
    /// Declared size in bytes, when known
    pub size: Option<u64>,
    /// Resumability mode
    pub mode: ResumeMode,
}

impl PartInfo {
    /// Create a descriptor
    pub fn new(url: Url, content_type: impl Into<String>, size: Option<u64>, mode: ResumeMode) -> Self {
        Self {
            url,
            content_type: Some(content_type.into()),
            size,
            mode,
        }
    }

    /// Whether on-disk progress made for `old` is still valid for this descriptor
    ///
    /// Both must use the same resumability mode and describe the same stream
    /// (content type and declared size). The URL may differ, since re-extraction
    /// commonly yields freshly signed URLs for the same stream.
    pub fn resumable_from(&self, old: &PartInfo) -> bool {
        self.mode == old.mode && self.size == old.size && self.content_type == old.content_type
    }
}

/// One stream of a job together with its transfer bookkeeping
#[derive(Clone, Debug)]
pub struct Part {
    info: PartInfo,
    pub(crate) target: Option<PathBuf>,
    pub(crate) state: PartState,
    pub(crate) error: Option<TransferError>,
    pub(crate) delay: u32,
    pub(crate) downloaded: u64,
}

impl Part {
    /// Wrap a freshly extracted descriptor
    pub fn new(info: PartInfo) -> Self {
        Self {
            info,
            target: None,
            state: PartState::Idle,
            error: None,
            delay: 0,
            downloaded: 0,
        }
    }

    /// The descriptor
    pub fn info(&self) -> &PartInfo {
        &self.info
    }

    /// Assigned target file
    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Transfer state
    pub fn state(&self) -> PartState {
        self.state
    }

    /// Last failure of this part
    pub fn error(&self) -> Option<&TransferError> {
        self.error.as_ref()
    }

    /// Remaining retry countdown reported by the transfer strategy
    pub fn delay(&self) -> u32 {
        self.delay
    }

    /// Bytes known to be on disk at the target
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Whether the part finished, or its recorded progress covers the declared size
    ///
    /// Parts without a declared size are only complete once a transfer finished them.
    pub fn is_complete(&self) -> bool {
        self.state == PartState::Done
            || matches!(self.info.size, Some(size) if size > 0 && self.downloaded == size)
    }

    /// Forget transfer progress (the target no longer holds verified bytes)
    pub(crate) fn reset(&mut self) {
        self.downloaded = 0;
        self.state = PartState::Idle;
        self.error = None;
        self.delay = 0;
    }

    /// Take over target and progress from the part this one replaces
    pub(crate) fn inherit(&mut self, old: &Part) {
        self.target = old.target.clone();
        self.downloaded = old.downloaded;
        if old.state == PartState::Done {
            self.state = PartState::Done;
        }
    }
}

/// Metadata returned by an extractor
#[derive(Clone, Debug, Default)]
pub struct Extracted {
    /// Human-readable title, used to name target files
    pub title: String,
    /// Streams to fetch, in download order
    pub parts: Vec<PartInfo>,
}

/// A download job: one media asset delivered as one or more parts
///
/// The job is owned and mutated by the coordinating task only; worker tasks
/// report back through messages.
#[derive(Clone, Debug)]
pub struct Job {
    source: Url,
    pub(crate) title: String,
    pub(crate) state: JobState,
    pub(crate) error: Option<Error>,
    pub(crate) delay: u32,
    pub(crate) parts: Vec<Part>,
    target_dir: Option<PathBuf>,
    target_force: Option<PathBuf>,
}

impl Job {
    /// Create a job for a source URL
    pub fn new(source: Url) -> Self {
        Self {
            source,
            title: String::new(),
            state: JobState::New,
            error: None,
            delay: 0,
            parts: Vec::new(),
            target_dir: None,
            target_force: None,
        }
    }

    /// Directory in which target files are named after the title
    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    /// Force the target file of a single-part job, bypassing title-based naming
    pub fn with_target(mut self, file: impl Into<PathBuf>) -> Self {
        self.target_force = Some(file.into());
        self
    }

    /// Source URL
    pub fn source(&self) -> &Url {
        &self.source
    }

    /// Title reported by the extractor (empty before extraction)
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Lifecycle state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Last failure, kept while retrying and after a terminal failure
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Remaining retry countdown ticks
    pub fn delay(&self) -> u32 {
        self.delay
    }

    /// Parts in download order
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Target directory set on the job
    pub fn target_dir(&self) -> Option<&Path> {
        self.target_dir.as_deref()
    }

    /// Forced target file set on the job
    pub fn target_force(&self) -> Option<&Path> {
        self.target_force.as_deref()
    }

    /// Whether metadata has not been extracted yet
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Total bytes on disk across parts
    pub fn downloaded(&self) -> u64 {
        self.parts.iter().map(Part::downloaded).sum()
    }

    /// Total declared size, when every part declares one
    pub fn size(&self) -> Option<u64> {
        self.parts.iter().map(|p| p.info().size).sum()
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
        self.delay = 0;
        if !matches!(state, JobState::Error | JobState::Stop) {
            self.error = None;
        }
    }

    pub(crate) fn set_failed(&mut self, state: JobState, error: Error) {
        self.state = state;
        self.delay = 0;
        self.error = Some(error);
    }

    pub(crate) fn set_retrying(&mut self, delay: u32, error: Error) {
        self.state = JobState::Retrying;
        self.delay = delay;
        self.error = Some(error);
    }

    /// Replace title and parts with freshly extracted metadata
    ///
    /// Returns the previous parts so they can be reconciled against the new ones.
    pub(crate) fn replace_parts(&mut self, extracted: Extracted) -> Vec<Part> {
        if !extracted.title.is_empty() || self.title.is_empty() {
            self.title = extracted.title;
        }
        let new_parts = extracted.parts.into_iter().map(Part::new).collect();
        std::mem::replace(&mut self.parts, new_parts)
    }
}
