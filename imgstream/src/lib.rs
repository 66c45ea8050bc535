//! imgstream - Session and task dispatch core for interactive image streaming
//!
//! This library provides the concurrency backbone of an image-streaming server:
//! client requests arrive over persistent per-client sessions and are turned into
//! tasks executed by a process-wide worker pool, without letting a slow client
//! starve others and without running unbounded work for superseded requests.
//!
//! # Architecture
//!
//! ```text
//! protocol layer ──► Dispatcher ──► WorkerPool (global FIFO) ──► Task::execute
//!                        │                                           │
//!                        ▼                                           ▼
//!                 CoalescingQueue (per file)                  Session methods
//!                 AnimationController (per session)          RequestHandler
//!                 SessionContext (cancellation)               (business logic)
//! ```
//!
//! # High-Level API
//!
//! ```ignore
//! use imgstream::dispatch::Dispatcher;
//! use imgstream::pool::WorkerPool;
//! use imgstream::session::SessionRegistry;
//!
//! let pool = WorkerPool::start(4)?;
//! let registry = SessionRegistry::new();
//! let dispatcher = Dispatcher::new(pool.submitter(), 5);
//!
//! let id = registry.connect(handler);
//! let session = registry.get(id).unwrap();
//! dispatcher.dispatch(&session, request)?;
//!
//! registry.disconnect(id)?;
//! pool.stop();
//! ```

pub mod animation;
pub mod coalesce;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod logging;
pub mod panic;
pub mod pool;
pub mod reduce;
pub mod request;
pub mod session;
pub mod task;

/// Version of the imgstream library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
