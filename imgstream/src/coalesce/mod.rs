//! Latest-wins request coalescing per open file.
//!
//! A client can emit channel, view or cursor changes far faster than the
//! server can render them, and only the most recent one per file matters.
//! Each open file gets a single-slot mailbox:
//!
//! ```text
//!  push(P1) ─┐
//!  push(P2) ─┼──► [ pending: P3 ] ──► drain ──► handler(P3)
//!  push(P3) ─┘      (P1, P2 superseded)   │
//!                                          └─ re-checks the slot before
//!                                             releasing its claim
//! ```
//!
//! # Guarantees
//!
//! - At most one execution is active per file at any time
//! - A burst of pushes before execution starts yields exactly one execution,
//!   using the last pushed value
//! - No request runs twice; the newest request is never silently dropped:
//!   an execution finishing while a newer request is pending keeps its claim
//!   and runs that request next
//!
//! Slots for different files have independent locks, so files are processed
//! in parallel. Lookups go through a validated file-id map; pushing to a file
//! that is not open is an error rather than an out-of-range access.

mod queue;
mod slot;

pub use queue::{CoalesceError, CoalescerStats, CoalescingQueue};
pub use slot::{Claim, CoalescingSlot, PushOutcome};
