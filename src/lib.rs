//! # Fanout - Bounded Async Work Dispatch
//!
//! A small toolkit for running user-supplied async work over a collection of
//! items with a fixed concurrency budget, optional batching, and optional
//! token-bucket rate limiting.
//!
//! ## Features
//!
//! - **Bounded concurrency**: semaphore-gated admission keeps the number of
//!   in-flight operations at or below the configured budget
//! - **Per-item error capture or fail-fast**: worker failures are recorded
//!   per item by default; fail-fast mode cancels siblings on the first error
//! - **Cooperative cancellation**: a single token stops new admissions and
//!   is observed by in-flight workers
//! - **Batching**: contiguous fixed-size batches processed concurrently
//! - **Rate limiting**: a periodically refilled token pool bounds the start
//!   rate independently of the concurrency width
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fanout::BoundedDispatcher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dispatcher = BoundedDispatcher::new(8)?;
//! let outcomes = dispatcher
//!     .run((0..100).collect(), |n, _cancel| async move { Ok(n * 2) })
//!     .await?;
//! assert_eq!(outcomes.len(), 100);
//! # Ok(())
//! # }
//! ```

pub mod advisor;
pub mod dispatch;

pub use dispatch::{
    BatchDispatcher, BoundedDispatcher, DispatchError, DispatchResult, FailureMode, ItemFailure,
    ItemResult, ProgressFn, RateLimitedDispatcher,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
