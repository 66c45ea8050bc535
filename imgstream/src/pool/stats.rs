//! Worker pool statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of worker pool activity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks accepted through `enqueue`
    pub enqueued: u64,
    /// Tasks that ran to completion (with or without a continuation)
    pub executed: u64,
    /// Follow-up tasks returned by a task and re-queued
    pub continuations: u64,
    /// Tasks that panicked while running
    pub panicked: u64,
    /// Tasks dropped without running because the pool shut down
    pub abandoned: u64,
}

/// Lock-free counters behind [`PoolStats`].
#[derive(Debug, Default)]
pub(super) struct PoolCounters {
    enqueued: AtomicU64,
    executed: AtomicU64,
    continuations: AtomicU64,
    panicked: AtomicU64,
    abandoned: AtomicU64,
}

impl PoolCounters {
    pub(super) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_continuation(&self) {
        self.continuations.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_abandoned(&self, count: usize) {
        self.abandoned.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> PoolStats {
        PoolStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            continuations: self.continuations.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}
