//! Cooperative cancellation for groups of parallel sub-computations.

use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation flag shared by the work units of one group operation.
///
/// Owned by the [`Session`](super::Session); long-running computations borrow
/// it for their duration. `cancel()` is advisory: a unit already running may
/// finish, but no new unit should start once [`is_cancelled`](Self::is_cancelled)
/// returns `true`. The flag is cleared with [`reset`](Self::reset) before the
/// next group operation begins.
#[derive(Debug, Default)]
pub struct SessionContext {
    cancelled: AtomicBool,
}

impl SessionContext {
    /// Create a context in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current group operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear the flag before starting a new group operation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
