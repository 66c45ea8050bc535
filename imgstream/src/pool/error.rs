//! Worker pool errors.

use std::io;
use thiserror::Error;

/// Errors returned by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool is shutting down or has stopped; the task was dropped.
    #[error("worker pool has been stopped")]
    Stopped,

    /// A pool needs at least one worker thread.
    #[error("worker pool needs at least one worker thread")]
    NoWorkers,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}
