//! Single-slot mailbox with an execution claim.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::error;

use crate::panic::panic_message;

/// What the caller of [`CoalescingSlot::push`] has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The slot was idle: schedule a drain for it.
    Schedule,
    /// A drain is already scheduled or running and will pick the request up.
    Coalesced,
    /// As `Coalesced`, and an older pending request was discarded.
    Superseded,
}

impl PushOutcome {
    /// Whether the caller must schedule a drain.
    pub fn needs_drain(self) -> bool {
        self == PushOutcome::Schedule
    }
}

/// Result of trying to claim a slot for execution.
#[derive(Debug, PartialEq, Eq)]
pub enum Claim<R> {
    /// The claim was taken; execute this request and call `end_execution`.
    Claimed(R),
    /// Another execution holds the claim; it will see any pending request.
    Busy,
    /// Nothing is pending.
    Empty,
}

#[derive(Debug)]
struct SlotState<R> {
    pending: Option<R>,
    executing: bool,
    drain_scheduled: bool,
}

/// Latest-wins mailbox for one file.
///
/// Holds at most one pending request plus an "executing" claim. All
/// operations are short critical sections; request handling happens outside
/// the lock.
#[derive(Debug)]
pub struct CoalescingSlot<R> {
    state: Mutex<SlotState<R>>,
}

impl<R> Default for CoalescingSlot<R> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                executing: false,
                drain_scheduled: false,
            }),
        }
    }
}

impl<R> CoalescingSlot<R> {
    /// Create an empty, idle slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `request` as the pending request, replacing any older one.
    pub fn push(&self, request: R) -> PushOutcome {
        let mut state = self.state.lock();
        let superseded = state.pending.replace(request);

        let outcome = if !state.executing && !state.drain_scheduled {
            state.drain_scheduled = true;
            PushOutcome::Schedule
        } else if superseded.is_some() {
            PushOutcome::Superseded
        } else {
            PushOutcome::Coalesced
        };
        drop(state);

        drop(superseded);
        outcome
    }

    /// Claim the slot and take the pending request.
    ///
    /// Also marks any scheduled drain as started.
    pub fn try_begin_execution(&self) -> Claim<R> {
        let mut state = self.state.lock();
        state.drain_scheduled = false;

        if state.executing {
            return Claim::Busy;
        }
        match state.pending.take() {
            Some(request) => {
                state.executing = true;
                Claim::Claimed(request)
            }
            None => Claim::Empty,
        }
    }

    /// Finish the current execution.
    ///
    /// If a newer request arrived meanwhile, the claim is kept and that
    /// request is returned so the caller executes it next; otherwise the claim
    /// is released and `None` is returned.
    pub fn end_execution(&self) -> Option<R> {
        let mut state = self.state.lock();
        debug_assert!(state.executing, "end_execution without a claim");

        match state.pending.take() {
            Some(request) => Some(request),
            None => {
                state.executing = false;
                None
            }
        }
    }

    /// Withdraw a drain scheduled by [`push`](Self::push) that could not be
    /// started. The pending request is kept and the next push schedules
    /// again.
    pub fn cancel_schedule(&self) {
        self.state.lock().drain_scheduled = false;
    }

    /// Run `execute` for the pending request and every request that arrives
    /// while it runs. Returns the number of executions.
    ///
    /// A panicking execution counts as executed; the slot still hands over
    /// any request that arrived meanwhile. Returns 0 without blocking if
    /// another thread holds the claim.
    pub fn drain<F>(&self, mut execute: F) -> usize
    where
        F: FnMut(R),
    {
        let mut next = match self.try_begin_execution() {
            Claim::Claimed(request) => request,
            Claim::Busy | Claim::Empty => return 0,
        };

        let mut executed = 0;
        loop {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| execute(next))) {
                error!(
                    message = %panic_message(payload.as_ref()),
                    "Coalesced request panicked"
                );
            }
            executed += 1;
            match self.end_execution() {
                Some(request) => next = request,
                None => break,
            }
        }
        executed
    }

    /// Whether an execution currently holds the claim.
    pub fn is_executing(&self) -> bool {
        self.state.lock().executing
    }

    /// Whether a request is waiting.
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_push_schedules() {
        let slot = CoalescingSlot::new();
        assert_eq!(slot.push(1), PushOutcome::Schedule);
        assert!(slot.has_pending());
    }

    #[test]
    fn test_burst_supersedes_pending() {
        let slot = CoalescingSlot::new();
        assert_eq!(slot.push("P1"), PushOutcome::Schedule);
        assert_eq!(slot.push("P2"), PushOutcome::Superseded);
        assert_eq!(slot.push("P3"), PushOutcome::Superseded);

        let mut seen = Vec::new();
        assert_eq!(slot.drain(|r| seen.push(r)), 1);
        assert_eq!(seen, vec!["P3"]);
        assert!(!slot.is_executing());
    }

    #[test]
    fn test_busy_claim_is_noop() {
        let slot = CoalescingSlot::new();
        slot.push(1);
        assert_eq!(slot.try_begin_execution(), Claim::Claimed(1));

        slot.push(2);
        assert_eq!(slot.try_begin_execution(), Claim::Busy);
        assert_eq!(slot.drain(|_| panic!("must not run while claimed")), 0);

        // Completing re-checks and hands over the newer request.
        assert_eq!(slot.end_execution(), Some(2));
        assert!(slot.is_executing());
        assert_eq!(slot.end_execution(), None);
        assert!(!slot.is_executing());
    }

    #[test]
    fn test_push_while_executing_does_not_schedule() {
        let slot = CoalescingSlot::new();
        slot.push(1);
        let Claim::Claimed(_) = slot.try_begin_execution() else {
            panic!("expected claim");
        };
        assert_eq!(slot.push(2), PushOutcome::Coalesced);
        assert_eq!(slot.push(3), PushOutcome::Superseded);
        assert_eq!(slot.end_execution(), Some(3));
        assert_eq!(slot.end_execution(), None);
    }

    #[test]
    fn test_push_after_drain_schedules_again() {
        let slot = CoalescingSlot::new();
        slot.push(1);
        slot.drain(|_| {});
        assert_eq!(slot.push(2), PushOutcome::Schedule);
    }

    #[test]
    fn test_empty_claim() {
        let slot: CoalescingSlot<u8> = CoalescingSlot::new();
        assert_eq!(slot.try_begin_execution(), Claim::Empty);
        assert!(!slot.is_executing());
    }

    #[test]
    fn test_drain_runs_requests_pushed_during_execution() {
        let slot = CoalescingSlot::new();
        slot.push(1);

        let mut seen = Vec::new();
        let executed = slot.drain(|r| {
            seen.push(r);
            if r < 3 {
                assert_eq!(slot.push(r + 1), PushOutcome::Coalesced);
            }
        });

        assert_eq!(executed, 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_panicking_execution_releases_claim() {
        let slot = CoalescingSlot::new();
        slot.push(1);

        assert_eq!(slot.drain(|_| panic!("handler failed")), 1);
        assert!(!slot.is_executing());
        assert_eq!(slot.push(2), PushOutcome::Schedule);
    }

    #[test]
    fn test_request_pushed_during_panicking_execution_still_runs() {
        let slot = CoalescingSlot::new();
        slot.push(1);

        let mut seen = Vec::new();
        let executed = slot.drain(|r| {
            if r == 1 {
                assert_eq!(slot.push(2), PushOutcome::Coalesced);
                panic!("handler failed on first request");
            }
            seen.push(r);
        });

        assert_eq!(executed, 2);
        assert_eq!(seen, vec![2]);
        assert!(!slot.is_executing());
        assert!(!slot.has_pending());
    }

    #[test]
    fn test_cancelled_schedule_allows_next_push_to_schedule() {
        let slot = CoalescingSlot::new();
        assert_eq!(slot.push(1), PushOutcome::Schedule);
        slot.cancel_schedule();

        assert!(slot.has_pending());
        assert_eq!(slot.push(2), PushOutcome::Schedule);
        let mut seen = Vec::new();
        slot.drain(|r| seen.push(r));
        assert_eq!(seen, vec![2]);
    }
}
