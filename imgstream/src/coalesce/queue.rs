//! File-id keyed set of coalescing slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use super::slot::{Claim, CoalescingSlot, PushOutcome};
use crate::request::FileId;

/// Errors from coalescing queue lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoalesceError {
    /// The file id has no slot (never opened, or already closed).
    #[error("file {0} is not open")]
    UnknownFile(FileId),
}

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Requests pushed
    pub pushed: u64,
    /// Pending requests replaced before they ran
    pub superseded: u64,
    /// Requests actually executed
    pub executed: u64,
}

impl CoalescerStats {
    /// Returns the fraction of pushed requests that never ran (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        if self.pushed == 0 {
            0.0
        } else {
            self.superseded as f64 / self.pushed as f64
        }
    }
}

/// One latest-wins slot per open file for a single request class.
///
/// Uses `DashMap` so lookups for different files don't contend; the slot
/// itself is cloned out of the map before it is locked, so no map shard lock
/// is held while a request executes.
///
/// # Example
///
/// ```
/// use imgstream::coalesce::CoalescingQueue;
/// use imgstream::request::FileId;
///
/// let queue = CoalescingQueue::new("SET_IMAGE_CHANNELS");
/// queue.open(FileId(7));
///
/// queue.push(FileId(7), "P1").unwrap();
/// queue.push(FileId(7), "P2").unwrap();
/// queue.push(FileId(7), "P3").unwrap();
///
/// let mut seen = Vec::new();
/// queue.drain(FileId(7), |r| seen.push(r)).unwrap();
/// assert_eq!(seen, vec!["P3"]);
/// ```
pub struct CoalescingQueue<R> {
    name: &'static str,
    slots: DashMap<FileId, Arc<CoalescingSlot<R>>>,
    pushed: AtomicU64,
    superseded: AtomicU64,
    executed: AtomicU64,
}

impl<R> CoalescingQueue<R> {
    /// Create an empty queue; `name` identifies the request class in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: DashMap::new(),
            pushed: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            executed: AtomicU64::new(0),
        }
    }

    /// Request class name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Create the slot for a newly opened file.
    ///
    /// Returns `false` if the file already has a slot (which is kept).
    pub fn open(&self, file_id: FileId) -> bool {
        match self.slots.entry(file_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(CoalescingSlot::new()));
                true
            }
        }
    }

    /// Remove the slot of a closed file, discarding any pending request.
    ///
    /// An execution already running keeps its own reference to the slot and
    /// completes normally.
    pub fn close(&self, file_id: FileId) -> bool {
        self.slots.remove(&file_id).is_some()
    }

    /// Remove every slot.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Whether `file_id` has a slot.
    pub fn contains(&self, file_id: FileId) -> bool {
        self.slots.contains_key(&file_id)
    }

    /// Number of open files.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no file is open.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, file_id: FileId) -> Result<Arc<CoalescingSlot<R>>, CoalesceError> {
        self.slots
            .get(&file_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(CoalesceError::UnknownFile(file_id))
    }

    /// Replace the pending request of `file_id` with `request`.
    ///
    /// When the outcome is [`PushOutcome::Schedule`] the caller must arrange
    /// for [`drain`](Self::drain) to run (normally by enqueueing a task).
    pub fn push(&self, file_id: FileId, request: R) -> Result<PushOutcome, CoalesceError> {
        let slot = self.slot(file_id)?;
        let outcome = slot.push(request);

        self.pushed.fetch_add(1, Ordering::Relaxed);
        if outcome == PushOutcome::Superseded {
            self.superseded.fetch_add(1, Ordering::Relaxed);
            debug!(
                queue = self.name,
                file_id = %file_id,
                "Superseded pending request"
            );
        }
        Ok(outcome)
    }

    /// Claim `file_id` for execution and take its pending request.
    pub fn try_begin_execution(&self, file_id: FileId) -> Result<Claim<R>, CoalesceError> {
        Ok(self.slot(file_id)?.try_begin_execution())
    }

    /// Finish an execution claimed with
    /// [`try_begin_execution`](Self::try_begin_execution).
    ///
    /// Returns the next request to execute if one arrived meanwhile (the
    /// claim is kept), or `None` after releasing the claim.
    pub fn end_execution(&self, file_id: FileId) -> Result<Option<R>, CoalesceError> {
        Ok(self.slot(file_id)?.end_execution())
    }

    /// Withdraw the drain scheduled by a push to `file_id` that could not be
    /// enqueued. A closed file has nothing to withdraw.
    pub fn cancel_schedule(&self, file_id: FileId) {
        if let Ok(slot) = self.slot(file_id) {
            slot.cancel_schedule();
        }
    }

    /// Execute the pending request of `file_id` and any that arrive while it
    /// runs. Returns the number of executions (0 if another thread holds the
    /// claim or nothing is pending).
    pub fn drain<F>(&self, file_id: FileId, execute: F) -> Result<usize, CoalesceError>
    where
        F: FnMut(R),
    {
        let slot = self.slot(file_id)?;
        let executed = slot.drain(execute);
        self.executed.fetch_add(executed as u64, Ordering::Relaxed);
        Ok(executed)
    }

    /// Whether an execution currently holds the claim for `file_id`.
    pub fn is_executing(&self, file_id: FileId) -> bool {
        self.slot(file_id)
            .map(|slot| slot.is_executing())
            .unwrap_or(false)
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
        }
    }
}

impl<R> std::fmt::Debug for CoalescingQueue<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingQueue")
            .field("name", &self.name)
            .field("files", &self.slots.len())
            .field("stats", &self.stats())
            .finish()
    }
}
