//! Batched dispatch atop the bounded engine
//!
//! Partitions the input into contiguous fixed-size batches and runs a
//! caller-supplied batch worker concurrently across batches. Partitioning
//! preserves input order; batch *processing* order is concurrent, so the
//! flattened output follows batch-completion order, not input order.
//! Callers that need input order should carry an index in their items.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bounded::BoundedDispatcher;
use super::error::{DispatchError, DispatchResult, FailureMode};
use super::progress::ProgressFn;

/// Split `items` into contiguous batches of at most `max_batch_size`.
///
/// The last batch is shorter when the size does not divide the input length.
/// Batches are built once and never mutated afterwards.
pub fn partition<T>(items: Vec<T>, max_batch_size: usize) -> Vec<Vec<T>> {
    let mut batches = Vec::with_capacity(items.len().div_ceil(max_batch_size.max(1)));
    let mut current = Vec::with_capacity(max_batch_size);
    for item in items {
        current.push(item);
        if current.len() == max_batch_size {
            batches.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(max_batch_size),
            ));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Dispatcher that processes contiguous batches of items concurrently.
///
/// A batch worker failure fails the whole call: the engine runs in
/// fail-fast mode, matching the all-or-nothing contract of the flattened
/// output (a silently missing batch would be indistinguishable from a
/// short input).
pub struct BatchDispatcher {
    inner_concurrency: usize,
    max_batch_size: usize,
    progress: Option<ProgressFn>,
    cancel: CancellationToken,
}

impl BatchDispatcher {
    /// Create a dispatcher with the given concurrency budget and batch size
    /// (both must be >= 1).
    pub fn new(concurrency: usize, max_batch_size: usize) -> DispatchResult<Self> {
        if concurrency < 1 {
            return Err(DispatchError::InvalidConfig(
                "concurrency budget must be >= 1".into(),
            ));
        }
        if max_batch_size < 1 {
            return Err(DispatchError::InvalidConfig(
                "batch size must be >= 1".into(),
            ));
        }
        Ok(Self {
            inner_concurrency: concurrency,
            max_batch_size,
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Report `(completed_batches, total_batches)` as batches finish.
    pub fn on_progress(mut self, callback: ProgressFn) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Observe an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run `batch_worker` once per batch, concurrently across batches, and
    /// flatten the batch outputs in batch-completion order.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, batch_worker: F) -> DispatchResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<R>>> + Send + 'static,
    {
        let total_items = items.len();
        let batches = partition(items, self.max_batch_size);
        debug!(
            total_items,
            batches = batches.len(),
            max_batch_size = self.max_batch_size,
            "dispatching batches"
        );

        let mut engine = BoundedDispatcher::new(self.inner_concurrency)?
            .failure_mode(FailureMode::FailFast)
            .with_cancellation(self.cancel.clone());
        if let Some(progress) = &self.progress {
            engine = engine.on_progress(Arc::clone(progress));
        }

        let outcomes = engine.run(batches, batch_worker).await?;

        let mut flattened = Vec::with_capacity(total_items);
        for outcome in outcomes {
            // Fail-fast mode never yields per-item failure markers.
            if let Ok(batch_results) = outcome {
                flattened.extend(batch_results);
            }
        }
        Ok(flattened)
    }
}
