//! Progress reporting for dispatcher invocations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Callback invoked after each completed item with `(completed, total)`
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Shared completion counter for one dispatcher invocation.
///
/// The counter is a plain atomic increment; the callback runs outside the
/// result-collection lock so a slow callback never extends lock hold time.
#[derive(Clone)]
pub(crate) struct ProgressTracker {
    total: usize,
    completed: Arc<AtomicUsize>,
    callback: Option<ProgressFn>,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize, callback: Option<ProgressFn>) -> Self {
        Self {
            total,
            completed: Arc::new(AtomicUsize::new(0)),
            callback,
        }
    }

    /// Record one completed item and report it to the callback, if any.
    pub(crate) fn record_one(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = &self.callback {
            callback(done, self.total);
        }
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reports_monotonic_counts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = ProgressTracker::new(
            3,
            Some(Arc::new(move |done, total| {
                sink.lock().unwrap().push((done, total));
            })),
        );

        tracker.record_one();
        tracker.record_one();
        tracker.record_one();

        assert_eq!(tracker.completed(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn works_without_callback() {
        let tracker = ProgressTracker::new(2, None);
        tracker.record_one();
        assert_eq!(tracker.completed(), 1);
    }
}
