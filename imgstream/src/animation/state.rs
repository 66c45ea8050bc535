//! Playback states and controller outputs.

use std::fmt;

use crate::request::FileId;

/// Playback state of one session's animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationState {
    /// Never started.
    #[default]
    Idle,
    /// Producing frames.
    Playing,
    /// Paused until the client acknowledges a frame.
    WaitingForFlowEvent,
    /// Terminal until the next start.
    Cancelled,
}

impl AnimationState {
    /// Whether playback is in progress (playing or paused on the flow window).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AnimationState::Playing | AnimationState::WaitingForFlowEvent
        )
    }
}

impl fmt::Display for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnimationState::Idle => "idle",
            AnimationState::Playing => "playing",
            AnimationState::WaitingForFlowEvent => "waiting_for_flow_event",
            AnimationState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The client sent a stop command.
    Stopped,
    /// The end of a non-looping range was reached.
    Completed,
    /// The animated file was closed.
    FileClosed,
    /// The client disconnected.
    Disconnected,
    /// The session gave up waiting for flow events.
    Aborted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CancelReason::Stopped => "stopped",
            CancelReason::Completed => "completed",
            CancelReason::FileClosed => "file_closed",
            CancelReason::Disconnected => "disconnected",
            CancelReason::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What an animation step should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// Produce this frame, then schedule another step.
    Produce(i32),
    /// The flow window is full; stop stepping until a flow event resumes.
    Wait,
    /// Playback has ended.
    Finished,
    /// The step belongs to a superseded playback.
    Stale,
}

/// Effect of a client acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Playback was paused and may continue: schedule a step for this file
    /// and generation.
    Resume { file_id: FileId, generation: u64 },
    /// Playback was running; nothing to schedule.
    Continue,
    /// No playback is active or nothing was outstanding.
    Ignored,
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationSnapshot {
    pub state: AnimationState,
    pub file_id: Option<FileId>,
    /// Frame the next step will produce.
    pub current_frame: i32,
    pub last_sent_frame: Option<i32>,
    pub unacknowledged: u32,
    pub flow_window: u32,
    pub frames_sent: u64,
    pub generation: u64,
    pub cancel_reason: Option<CancelReason>,
}
