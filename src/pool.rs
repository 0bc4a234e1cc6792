//! Bounded worker pool with cooperative cancellation
//!
//! [`WorkerPool::run`] spawns one tokio task per submitted job, never more than
//! `limit` at once: submission waits for a free permit, which gives the caller
//! backpressure. Each task receives a child [`CancellationToken`]. When the
//! caller's token fires, the pool cancels every worker, waits for all of them to
//! exit, and only then returns [`Error::Interrupted`], so no worker outlives the
//! `run` call.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Runs tasks with at most `limit` in flight
#[derive(Debug, Clone)]
pub struct WorkerPool {
    limit: usize,
}

impl WorkerPool {
    /// Create a pool; a limit of zero is treated as one
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    /// Maximum number of concurrently running tasks
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task to completion and return their outputs in submission order
    ///
    /// Tasks are started in iteration order. Each task factory receives the token
    /// its worker must watch; that token is a child of `cancel`, so tearing the
    /// pool down never cancels the caller's token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interrupted`] when `cancel` fires before every task has
    /// finished. By then every spawned worker has exited.
    ///
    /// # Panics
    ///
    /// A panic inside a worker is re-raised on the caller after the remaining
    /// workers have been cancelled and joined.
    pub async fn run<I, F, Fut, T>(&self, tasks: I, cancel: &CancellationToken) -> Result<Vec<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let workers = cancel.child_token();
        let mut set: JoinSet<(usize, T)> = JoinSet::new();
        let mut outputs: Vec<Option<T>> = Vec::new();

        for (index, task) in tasks.into_iter().enumerate() {
            outputs.push(None);

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                return Err(teardown(set, &workers, "stopped while submitting").await);
            };

            let future = task(workers.clone());
            set.spawn(async move {
                let output = future.await;
                drop(permit);
                (index, output)
            });
            tracing::trace!(task = index, limit = self.limit, "Worker started");
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                joined = set.join_next() => Some(joined),
            };
            let Some(joined) = joined else {
                return Err(teardown(set, &workers, "stopped while waiting").await);
            };

            match joined {
                None => break,
                Some(Ok((index, output))) => {
                    if let Some(slot) = outputs.get_mut(index) {
                        *slot = Some(output);
                    }
                }
                Some(Err(e)) if e.is_panic() => {
                    let panic = e.into_panic();
                    let _ = teardown(set, &workers, "worker panicked").await;
                    std::panic::resume_unwind(panic);
                }
                Some(Err(_)) => {
                    return Err(teardown(set, &workers, "worker aborted").await);
                }
            }
        }

        Ok(outputs.into_iter().flatten().collect())
    }
}

/// Cancel all workers and wait for every one of them to exit
async fn teardown<T: 'static>(
    mut set: JoinSet<T>,
    workers: &CancellationToken,
    reason: &str,
) -> Error {
    workers.cancel();
    let in_flight = set.len();
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined
            && e.is_panic()
        {
            tracing::error!(reason, "Worker panicked during teardown");
        }
    }
    tracing::debug!(reason, in_flight, "Worker pool torn down");
    Error::Interrupted(reason.to_string())
}
