//! Bounded async work dispatch
//!
//! This module provides a reusable dispatch infrastructure for running a
//! caller-supplied async worker over a collection of items under explicit
//! resource constraints.
//!
//! # Architecture Responsibilities
//!
//! The dispatch module focuses exclusively on **admission control** and
//! **result aggregation**:
//!
//! ## What This Module Does:
//! - **Concurrency bounding**: a semaphore gate admits at most the budgeted
//!   number of workers at any instant
//! - **Rate bounding**: an optional token pool, refilled once per window,
//!   bounds how many workers may *start* per window
//! - **Aggregation**: collects results (or per-item failure markers) into a
//!   collection owned by one invocation, behind a single mutex
//! - **Cancellation**: one token stops new admissions and is observed
//!   cooperatively by in-flight workers
//!
//! ## What This Module Does NOT Do:
//! - **Domain logic**: workers are opaque async functions; their internals,
//!   retries, and I/O belong to the caller
//! - **Cross-call state**: every counter, lock, and token pool lives for
//!   exactly one dispatcher invocation
//!
//! # Dispatchers
//!
//! - [`BoundedDispatcher`] — the shared execution engine: runs one worker
//!   per item with a fixed maximum in-flight count
//! - [`BatchDispatcher`] — partitions the input into contiguous fixed-size
//!   batches and dispatches each batch through the bounded engine
//! - [`RateLimitedDispatcher`] — additionally requires a rate token before
//!   each worker starts, independent of the concurrency width
//!
//! # Example
//!
//! ```rust,no_run
//! use fanout::dispatch::BoundedDispatcher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dispatcher = BoundedDispatcher::new(4)?;
//! let outcomes = dispatcher
//!     .run(vec!["a", "b", "c"], |item, _cancel| async move {
//!         Ok(item.to_uppercase())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod bounded;
pub mod error;
pub mod progress;
pub mod rate;

pub use batch::{partition, BatchDispatcher};
pub use bounded::BoundedDispatcher;
pub use error::{DispatchError, DispatchResult, FailureMode, ItemFailure, ItemResult};
pub use progress::ProgressFn;
pub use rate::RateLimitedDispatcher;
