//! Bounded-concurrency execution engine
//!
//! Runs a caller-supplied async worker over a sequence of items with a fixed
//! maximum number of concurrently in-flight operations. Admission follows a
//! sliding-window policy: the submission loop acquires one semaphore permit
//! per item before spawning it, and each completion frees a slot for the
//! next queued item. Results are collected in completion order behind a
//! single mutex; the worker body never runs while that lock is held.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{DispatchError, DispatchResult, FailureMode, ItemFailure, ItemResult};
use super::progress::{ProgressFn, ProgressTracker};
use crate::advisor;

/// Dispatcher that bounds the number of concurrently in-flight workers.
///
/// Construction validates the budget; `run` owns all shared state for one
/// invocation and returns it to the caller on completion. Nothing persists
/// across calls.
pub struct BoundedDispatcher {
    concurrency: usize,
    failure_mode: FailureMode,
    progress: Option<ProgressFn>,
    cancel: CancellationToken,
}

impl BoundedDispatcher {
    /// Create a dispatcher with the given concurrency budget (must be >= 1).
    pub fn new(concurrency: usize) -> DispatchResult<Self> {
        if concurrency < 1 {
            return Err(DispatchError::InvalidConfig(
                "concurrency budget must be >= 1".into(),
            ));
        }
        Ok(Self {
            concurrency,
            failure_mode: FailureMode::default(),
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Create a dispatcher sized for I/O-bound work on this machine.
    pub fn with_default_concurrency() -> Self {
        let concurrency = advisor::io_degree(
            advisor::DEFAULT_IO_MULTIPLIER,
            advisor::DEFAULT_IO_MAX_DEGREE,
        )
        .max(1);
        Self {
            concurrency,
            failure_mode: FailureMode::default(),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Select how worker failures are handled.
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Report `(completed, total)` after each finished item.
    pub fn on_progress(mut self, callback: ProgressFn) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Observe an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The configured concurrency budget.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `worker` over `items` with at most the budgeted number in flight.
    ///
    /// Returns one entry per input item in completion order: the worker's
    /// value, or its failure marker in collect mode. Fail-fast mode promotes
    /// the first failure to [`DispatchError::WorkerFailed`] and cancels
    /// siblings. Cancellation discards partial results and returns
    /// [`DispatchError::Cancelled`].
    ///
    /// The worker receives a cancellation token it is expected to observe at
    /// its own suspension points; the engine additionally races each worker
    /// against that token so cancelled items exit promptly.
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        worker: F,
    ) -> DispatchResult<Vec<ItemResult<R>>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        debug!(total, concurrency = self.concurrency, "dispatching items");

        let worker = Arc::new(worker);
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let results: Arc<Mutex<Vec<ItemResult<R>>>> =
            Arc::new(Mutex::new(Vec::with_capacity(total)));
        let progress = ProgressTracker::new(total, self.progress.clone());
        // Child of the caller's token: tripped by fail-fast without
        // cancelling the caller's own token.
        let effective = self.cancel.child_token();
        let first_error: Arc<Mutex<Option<ItemFailure>>> = Arc::new(Mutex::new(None));
        let fail_fast = self.failure_mode == FailureMode::FailFast;
        let mut tasks: JoinSet<()> = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            // Admission: one permit per item, or stop on cancellation.
            let permit = tokio::select! {
                _ = effective.cancelled() => break,
                permit = Arc::clone(&gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let worker = Arc::clone(&worker);
            let results = Arc::clone(&results);
            let first_error = Arc::clone(&first_error);
            let progress = progress.clone();
            let token = effective.clone();

            tasks.spawn(async move {
                // Held for the task's lifetime; releasing it admits the
                // next queued item.
                let _permit = permit;

                let outcome = tokio::select! {
                    _ = token.cancelled() => return,
                    outcome = worker(item, token.clone()) => outcome,
                };

                match outcome {
                    Ok(value) => {
                        results.lock().await.push(Ok(value));
                        progress.record_one();
                    }
                    Err(err) => {
                        let failure = ItemFailure {
                            index,
                            message: format!("{err:#}"),
                        };
                        if fail_fast {
                            let mut slot = first_error.lock().await;
                            if slot.is_none() {
                                *slot = Some(failure);
                                token.cancel();
                            }
                        } else {
                            warn!(index, error = %failure.message, "work item failed");
                            results.lock().await.push(Err(failure));
                            progress.record_one();
                        }
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    effective.cancel();
                    while tasks.join_next().await.is_some() {}
                    return Err(DispatchError::WorkerFailed(format!(
                        "worker panicked: {err}"
                    )));
                }
            }
        }

        // The caller's cancellation wins over a concurrent fail-fast trip.
        if self.cancel.is_cancelled() {
            let completed = progress.completed();
            info!(completed, total, "dispatch cancelled");
            return Err(DispatchError::Cancelled { completed, total });
        }
        if let Some(failure) = first_error.lock().await.take() {
            return Err(DispatchError::WorkerFailed(format!(
                "item {}: {}",
                failure.index, failure.message
            )));
        }

        let results = match Arc::try_unwrap(results) {
            Ok(collection) => collection.into_inner(),
            // Unreachable once every task has joined, but avoid a panic path.
            Err(shared) => std::mem::take(&mut *shared.lock().await),
        };
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn rejects_zero_concurrency() {
        let err = BoundedDispatcher::new(0).err().unwrap();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
    }

    #[test]
    fn default_concurrency_is_positive() {
        assert!(BoundedDispatcher::with_default_concurrency().concurrency() >= 1);
    }

    #[tokio::test]
    async fn empty_input_returns_empty_collection() {
        let dispatcher = BoundedDispatcher::new(4).unwrap();
        let outcomes = dispatcher
            .run(Vec::<u32>::new(), |n, _| async move { Ok(n) })
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn collects_one_outcome_per_item() {
        let dispatcher = BoundedDispatcher::new(3).unwrap();
        let outcomes = dispatcher
            .run((0..10).collect(), |n: u32, _| async move {
                if n % 2 == 0 {
                    Ok(n * 10)
                } else {
                    anyhow::bail!("odd item {n}")
                }
            })
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 10);
        let failures = outcomes.iter().filter(|o| o.is_err()).count();
        assert_eq!(failures, 5);

        let mut successes: Vec<u32> = outcomes.into_iter().filter_map(|o| o.ok()).collect();
        successes.sort_unstable();
        assert_eq!(successes, vec![0, 20, 40, 60, 80]);
    }

    #[tokio::test]
    async fn fail_fast_promotes_first_error() {
        let started = Arc::new(AtomicUsize::new(0));
        let gauge = Arc::clone(&started);
        let dispatcher = BoundedDispatcher::new(2)
            .unwrap()
            .failure_mode(FailureMode::FailFast);

        let err = dispatcher
            .run((0..50).collect(), move |n: u32, _| {
                let gauge = Arc::clone(&gauge);
                async move {
                    gauge.fetch_add(1, Ordering::Relaxed);
                    if n == 1 {
                        anyhow::bail!("boom")
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(n)
                }
            })
            .await
            .err()
            .unwrap();

        assert!(matches!(err, DispatchError::WorkerFailed(_)));
        assert!(err.to_string().contains("boom"));
        // The first failure must have stopped admissions well short of 50.
        assert!(started.load(Ordering::Relaxed) < 50);
    }

    #[tokio::test]
    async fn worker_panic_becomes_aggregate_failure() {
        let dispatcher = BoundedDispatcher::new(2).unwrap();
        let err = dispatcher
            .run((0..4).collect(), |n: u32, _| async move {
                if n == 2 {
                    panic!("worker exploded");
                }
                Ok(n)
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::WorkerFailed(_)));
    }

    #[tokio::test]
    async fn cancel_before_start_reports_zero_completed() {
        let token = CancellationToken::new();
        token.cancel();
        let dispatcher = BoundedDispatcher::new(4).unwrap().with_cancellation(token);

        let err = dispatcher
            .run((0..8).collect(), |n: u32, _| async move { Ok(n) })
            .await
            .err()
            .unwrap();

        match err {
            DispatchError::Cancelled { completed, total } => {
                assert_eq!(completed, 0);
                assert_eq!(total, 8);
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
