//! Rate-limited dispatch atop the bounded engine
//!
//! Bounds the *start rate* of workers (operations per time window)
//! independently of the concurrency width. A worker starts only after
//! acquiring both a concurrency slot and one token from a pool that a
//! background task tops back up to capacity once per window. This is a
//! fixed-window approximation: bursts at window boundaries may momentarily
//! reach twice the nominal rate.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::bounded::BoundedDispatcher;
use super::error::{DispatchError, DispatchResult, FailureMode};
use super::progress::ProgressFn;

/// Default refill window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Token pool scoped to one dispatcher invocation.
///
/// Acquired tokens are consumed (`forget`), so completions do not return
/// them; only the periodic refill and explicit refunds for failed attempts
/// add tokens back. Dropping the pool aborts the refill task, so teardown
/// happens on success, error, and cancellation alike.
struct TokenPool {
    tokens: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl TokenPool {
    fn start(capacity: usize, window: Duration) -> Self {
        let tokens = Arc::new(Semaphore::new(capacity));
        let pool = Arc::clone(&tokens);
        let refill = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the pool starts full.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Top up to capacity rather than resetting, so tokens still
                // available from the previous window are never lost.
                let deficit = capacity.saturating_sub(pool.available_permits());
                if deficit > 0 {
                    pool.add_permits(deficit);
                    trace!(deficit, "refilled rate tokens");
                }
            }
        });
        Self { tokens, refill }
    }

    fn tokens(&self) -> Arc<Semaphore> {
        Arc::clone(&self.tokens)
    }
}

impl Drop for TokenPool {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

/// Dispatcher that bounds both in-flight width and start rate.
///
/// Runs in fail-fast mode: a worker failure refunds its rate token (the
/// failed attempt does not count against the budget) and then fails the
/// whole call. Successful results are returned as a mapping keyed by the
/// input item.
pub struct RateLimitedDispatcher {
    concurrency: usize,
    tokens_per_window: usize,
    window: Duration,
    progress: Option<ProgressFn>,
    cancel: CancellationToken,
}

impl RateLimitedDispatcher {
    /// Create a dispatcher with the given concurrency budget and per-window
    /// token count (both must be >= 1). The window defaults to one second.
    pub fn new(concurrency: usize, tokens_per_window: usize) -> DispatchResult<Self> {
        if concurrency < 1 {
            return Err(DispatchError::InvalidConfig(
                "concurrency budget must be >= 1".into(),
            ));
        }
        if tokens_per_window < 1 {
            return Err(DispatchError::InvalidConfig(
                "tokens per window must be >= 1".into(),
            ));
        }
        Ok(Self {
            concurrency,
            tokens_per_window,
            window: DEFAULT_WINDOW,
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Set the refill window (must be non-zero; validated at run time).
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
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

    /// Run `worker` over `items`, starting at most `tokens_per_window`
    /// workers per window and keeping at most the concurrency budget in
    /// flight. Returns a mapping from each input item to its result.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> DispatchResult<HashMap<T, R>>
    where
        T: Clone + Eq + Hash + Send + Sync + 'static,
        R: Send + 'static,
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        if self.window.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "refill window must be non-zero".into(),
            ));
        }
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        debug!(
            total = items.len(),
            concurrency = self.concurrency,
            tokens_per_window = self.tokens_per_window,
            window_ms = self.window.as_millis() as u64,
            "dispatching rate-limited items"
        );

        let pool = TokenPool::start(self.tokens_per_window, self.window);
        let tokens = pool.tokens();
        let worker = Arc::new(worker);

        let mut engine = BoundedDispatcher::new(self.concurrency)?
            .failure_mode(FailureMode::FailFast)
            .with_cancellation(self.cancel.clone());
        if let Some(progress) = &self.progress {
            engine = engine.on_progress(Arc::clone(progress));
        }

        let outcomes = engine
            .run(items, move |item: T, token: CancellationToken| {
                let worker = Arc::clone(&worker);
                let tokens = Arc::clone(&tokens);
                async move {
                    // Admission completes only once a rate token is
                    // available; the concurrency slot is already held.
                    let permit = Arc::clone(&tokens)
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("rate token pool closed"))?;
                    // Consume the token: it bounds starts, not completions.
                    permit.forget();

                    let key = item.clone();
                    match worker(item, token).await {
                        Ok(value) => Ok((key, value)),
                        Err(err) => {
                            // A failed attempt does not count against the
                            // rate budget; refund before propagating.
                            tokens.add_permits(1);
                            Err(err)
                        }
                    }
                }
            })
            .await;

        // Stop the refill task before surfacing any outcome.
        drop(pool);

        let outcomes = outcomes?;
        Ok(outcomes.into_iter().filter_map(|o| o.ok()).collect())
    }
}
