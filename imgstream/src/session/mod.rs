//! Per-client sessions and their lifecycle.
//!
//! A [`Session`] holds everything one client owns: open files, the per-file
//! coalescing queues, the animation controller and the cancellation contexts.
//! It is shared between the connection and every task working for it through
//! [`SessionHandle`], an atomically counted reference:
//!
//! ```text
//!   connect ──► registry holds 1 ref
//!   dispatch ──► each Task holds +1 ref  ──► dropped when the task ends
//!   disconnect ──► registry releases its ref
//!
//!   destroyed at whichever release is last
//! ```
//!
//! The count is the `Arc` strong count, so a decrement past zero cannot be
//! expressed and exactly one release observes the transition to zero.

mod context;
mod error;
mod handle;
mod registry;

pub use context::SessionContext;
pub use error::SessionError;
pub use handle::{Release, Session, SessionHandle, SessionId};
pub use registry::SessionRegistry;
