//! Process-wide worker pool.
//!
//! A fixed set of OS threads drains one global FIFO queue. Producers (the
//! dispatcher, running tasks returning continuations) append to the back of the
//! queue; each worker blocks until the queue is non-empty or shutdown has been
//! requested.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ─┐                                    ┌─► worker-0 ─► task.run()
//!             │    ┌──────────────────────────┐    │
//! Dispatcher ─┼──► │ Mutex<VecDeque<T>> + Cv  │ ───┼─► worker-1 ─► task.run()
//!             │    └──────────────────────────┘    │
//! continuation┘              ▲                     └─► worker-N ─► task.run()
//!                            └──────── Some(next) ◄──────────┘
//! ```
//!
//! # Guarantees
//!
//! - FIFO across producers as interleaved by the single queue lock
//! - A worker never removes from an empty queue: it waits on
//!   "non-empty or shutdown" and re-tests the predicate after waking
//! - A panicking task is contained; the worker logs it and keeps serving
//! - `shutdown()` abandons queued tasks (they are dropped, not run) and
//!   rejects further submissions

mod error;
mod stats;
mod worker_pool;

pub use error::PoolError;
pub use stats::PoolStats;
pub use worker_pool::{PoolSubmitter, Runnable, WorkerPool};
