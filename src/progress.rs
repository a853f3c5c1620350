//! Progress reporting and cooperative cancellation for long batch passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress from long-running passes (factor regressions, fold fits).
///
/// Implementors must be `Send + Sync`: callbacks arrive from rayon workers.
pub trait ProgressHook: Send + Sync {
    /// `done` out of `total` units of `stage` are complete.
    fn on_progress(&self, _stage: &str, _done: usize, _total: usize) {}

    /// Return true to stop the pass at the next checkpoint.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Hook that ignores progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressHook for NoProgress {}

/// Shared cancellation flag usable as a hook.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ProgressHook for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
