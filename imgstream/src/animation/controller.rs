//! Flow-controlled playback state machine.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::settings::{AnimationError, AnimationSettings};
use super::state::{AnimationSnapshot, AnimationState, CancelReason, FlowOutcome, FrameStep};
use crate::request::FileId;

#[derive(Debug)]
struct Playback {
    state: AnimationState,
    settings: Option<AnimationSettings>,
    file_id: Option<FileId>,
    /// Next frame to produce, or `None` once a non-looping range is exhausted.
    next_frame: Option<i32>,
    last_sent_frame: Option<i32>,
    unacknowledged: u32,
    frames_sent: u64,
    generation: u64,
    cancel_reason: Option<CancelReason>,
    waiting_since: Option<Instant>,
}

impl Playback {
    fn snapshot(&self) -> AnimationSnapshot {
        AnimationSnapshot {
            state: self.state,
            file_id: self.file_id,
            current_frame: self
                .next_frame
                .or(self.last_sent_frame)
                .unwrap_or_default(),
            last_sent_frame: self.last_sent_frame,
            unacknowledged: self.unacknowledged,
            flow_window: self.settings.map(|s| s.flow_window).unwrap_or(0),
            frames_sent: self.frames_sent,
            generation: self.generation,
            cancel_reason: self.cancel_reason,
        }
    }

    fn cancel(&mut self, reason: CancelReason) {
        self.state = AnimationState::Cancelled;
        self.cancel_reason = Some(reason);
        self.waiting_since = None;
    }
}

/// Per-session animation playback throttled by client acknowledgements.
///
/// # State machine
///
/// ```text
///            start                   window full
///   Idle ───────────► Playing ─────────────────────► WaitingForFlowEvent
///                      ▲  │ ◄──────────────────────────────┘
///                      │  │        flow event (Resume)
///                start │  │ stop / end of range / file closed / abort
///                      │  ▼
///                    Cancelled ◄──── (also from WaitingForFlowEvent)
/// ```
///
/// Exactly one animation step is outstanding while playing: a step that
/// produces a frame schedules the next one, a step that hits the flow window
/// schedules nothing, and the acknowledgement that frees the window returns
/// [`FlowOutcome::Resume`] so the caller schedules the next step.
///
/// Every start bumps a generation counter. Steps carry the generation they
/// were scheduled for, so a step left over from an earlier playback is
/// reported as [`FrameStep::Stale`] and does nothing.
#[derive(Debug)]
pub struct AnimationController {
    inner: Mutex<Playback>,
}

impl Default for AnimationController {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Playback {
                state: AnimationState::Idle,
                settings: None,
                file_id: None,
                next_frame: None,
                last_sent_frame: None,
                unacknowledged: 0,
                frames_sent: 0,
                generation: 0,
                cancel_reason: None,
                waiting_since: None,
            }),
        }
    }
}

impl AnimationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) playback of `file_id`.
    ///
    /// Counters are reset and the start frame is clamped into the range.
    /// Returns the generation the first step must be scheduled with.
    pub fn start(&self, file_id: FileId, settings: AnimationSettings) -> Result<u64, AnimationError> {
        settings.validate()?;

        let mut playback = self.inner.lock();
        playback.generation += 1;
        playback.state = AnimationState::Playing;
        playback.settings = Some(settings);
        playback.file_id = Some(file_id);
        playback.next_frame = Some(settings.clamp(settings.start_frame));
        playback.last_sent_frame = None;
        playback.unacknowledged = 0;
        playback.frames_sent = 0;
        playback.cancel_reason = None;
        playback.waiting_since = None;

        debug!(
            file_id = %file_id,
            generation = playback.generation,
            first = settings.first_frame,
            last = settings.last_frame,
            step = settings.step,
            window = settings.flow_window,
            "Animation started"
        );
        Ok(playback.generation)
    }

    /// Decide what the step scheduled for `generation` should do.
    ///
    /// A produced frame counts as unacknowledged immediately.
    pub fn next_frame(&self, generation: u64) -> FrameStep {
        let mut playback = self.inner.lock();
        if generation != playback.generation {
            return FrameStep::Stale;
        }

        match playback.state {
            AnimationState::Idle | AnimationState::Cancelled => return FrameStep::Finished,
            AnimationState::WaitingForFlowEvent => return FrameStep::Wait,
            AnimationState::Playing => {}
        }

        let Some(settings) = playback.settings else {
            return FrameStep::Finished;
        };
        let Some(frame) = playback.next_frame else {
            playback.cancel(CancelReason::Completed);
            debug!(generation, frames = playback.frames_sent, "Animation completed");
            return FrameStep::Finished;
        };

        if playback.unacknowledged >= settings.flow_window {
            playback.state = AnimationState::WaitingForFlowEvent;
            playback.waiting_since = Some(Instant::now());
            debug!(
                generation,
                unacknowledged = playback.unacknowledged,
                "Animation waiting for flow event"
            );
            return FrameStep::Wait;
        }

        playback.unacknowledged += 1;
        playback.frames_sent += 1;
        playback.last_sent_frame = Some(frame);
        playback.next_frame = settings.advance(frame);
        FrameStep::Produce(frame)
    }

    /// Record a client acknowledgement of `received_frame` of `file_id`.
    ///
    /// Acknowledgements for another file, or beyond the number of frames
    /// outstanding, are ignored.
    pub fn notify_flow_event(&self, file_id: FileId, received_frame: i32) -> FlowOutcome {
        let mut playback = self.inner.lock();
        if !playback.state.is_active() || playback.unacknowledged == 0 {
            return FlowOutcome::Ignored;
        }
        let Some(playing) = playback.file_id.filter(|playing| *playing == file_id) else {
            debug!(%file_id, received_frame, "Flow event for a file not being animated");
            return FlowOutcome::Ignored;
        };

        playback.unacknowledged -= 1;
        if playback.state == AnimationState::Playing {
            return FlowOutcome::Continue;
        }

        let window = playback.settings.map(|s| s.flow_window).unwrap_or(1);
        if playback.unacknowledged < window {
            playback.state = AnimationState::Playing;
            playback.waiting_since = None;
            debug!(
                received_frame,
                unacknowledged = playback.unacknowledged,
                "Animation resumed"
            );
            FlowOutcome::Resume {
                file_id: playing,
                generation: playback.generation,
            }
        } else {
            FlowOutcome::Continue
        }
    }

    /// Stop playback on client request.
    pub fn stop(&self) -> Result<AnimationSnapshot, AnimationError> {
        let mut playback = self.inner.lock();
        if !playback.state.is_active() {
            return Err(AnimationError::NotRunning);
        }
        playback.cancel(CancelReason::Stopped);
        debug!(frames = playback.frames_sent, "Animation stopped");
        Ok(playback.snapshot())
    }

    /// Cancel an active playback. Returns `false` if none was active.
    pub fn abort(&self, reason: CancelReason) -> bool {
        let mut playback = self.inner.lock();
        if !playback.state.is_active() {
            return false;
        }
        playback.cancel(reason);
        debug!(reason = %reason, "Animation cancelled");
        true
    }

    /// Cancel playback if it is animating `file_id`.
    pub fn cancel_for_file(&self, file_id: FileId) -> bool {
        let mut playback = self.inner.lock();
        if !playback.state.is_active() || playback.file_id != Some(file_id) {
            return false;
        }
        playback.cancel(CancelReason::FileClosed);
        debug!(file_id = %file_id, "Animation cancelled, file closed");
        true
    }

    /// Cancel playback that has waited for a flow event longer than `limit`.
    pub fn abort_if_stalled(&self, limit: Duration) -> bool {
        let mut playback = self.inner.lock();
        let stalled = playback
            .waiting_since
            .is_some_and(|since| since.elapsed() >= limit);
        if !stalled {
            return false;
        }
        playback.cancel(CancelReason::Aborted);
        debug!(
            waited_ms = limit.as_millis() as u64,
            "Animation aborted, no flow event"
        );
        true
    }

    /// Current state.
    pub fn state(&self) -> AnimationState {
        self.inner.lock().state
    }

    /// Generation of the most recent start.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Returns a snapshot of the playback.
    pub fn snapshot(&self) -> AnimationSnapshot {
        self.inner.lock().snapshot()
    }
}
