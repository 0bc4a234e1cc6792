//! Observer recording job snapshots for assertions

use media_dl::{Error, Job, JobState, Observer};
use std::sync::Mutex;

/// One observer notification
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Job state at the time of the notification
    pub state: JobState,
    /// Remaining retry countdown
    pub delay: u32,
    /// Last error on the job
    pub error: Option<Error>,
    /// Bytes on disk across parts
    pub downloaded: u64,
}

/// Observer that keeps every snapshot it receives
#[derive(Default)]
pub struct Recorder {
    snapshots: Mutex<Vec<Snapshot>>,
}

impl Observer for Recorder {
    fn notify(&self, job: &Job) {
        self.snapshots.lock().unwrap().push(Snapshot {
            state: job.state(),
            delay: job.delay(),
            error: job.error().cloned(),
            downloaded: job.downloaded(),
        });
    }
}

impl Recorder {
    /// Every snapshot so far
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    /// States in notification order with consecutive duplicates removed
    pub fn states(&self) -> Vec<JobState> {
        let mut states: Vec<JobState> = self.snapshots().iter().map(|s| s.state).collect();
        states.dedup();
        states
    }

    /// Countdown values reported while retrying, in order
    pub fn retry_ticks(&self) -> Vec<u32> {
        self.snapshots()
            .iter()
            .filter(|s| s.state == JobState::Retrying)
            .map(|s| s.delay)
            .collect()
    }

    /// The most recent snapshot
    pub fn last(&self) -> Option<Snapshot> {
        self.snapshots().last().cloned()
    }
}
