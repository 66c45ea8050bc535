//! Turning decoded requests into session updates and pool tasks.
//!
//! Short bookkeeping requests (file open/close, animation control, histogram
//! cancellation) are applied inline on the calling thread. Everything that
//! calls into a potentially slow handler becomes a [`Task`]. Latest-wins
//! request classes go through the session's per-file coalescing queue first
//! and only enqueue a task when no drain is already pending or running:
//!
//! ```text
//! SET_IMAGE_CHANNELS(file 7) ──► push ──► Schedule  ──► enqueue drain task
//!                                     └─► Coalesced ──► nothing (drain picks it up)
//! ```

use thiserror::Error;
use tracing::{debug, warn};

use crate::animation::{AnimationError, AnimationSettings, FlowOutcome};
use crate::coalesce::PushOutcome;
use crate::pool::{PoolError, PoolSubmitter};
use crate::request::{FileId, Request};
use crate::session::{SessionError, SessionHandle};
use crate::task::{Task, TaskKind};

/// How a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Applied on the calling thread.
    Inline,
    /// A task was enqueued.
    Enqueued,
    /// Stored for a drain that is already scheduled or running.
    Coalesced,
}

/// Reasons a request was rejected. No task is created for a rejected request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Animation(#[from] AnimationError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Routes decoded requests for any session to the worker pool.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    submitter: PoolSubmitter<Task>,
    flow_window: u32,
}

impl Dispatcher {
    /// Create a dispatcher; `flow_window` applies to animations whose start
    /// request does not specify one.
    pub fn new(submitter: PoolSubmitter<Task>, flow_window: u32) -> Self {
        Self {
            submitter,
            flow_window: flow_window.max(1),
        }
    }

    /// Default animation flow window.
    pub fn flow_window(&self) -> u32 {
        self.flow_window
    }

    /// Apply or enqueue one request for `session`.
    ///
    /// Rejected requests are logged and reported; the session and its other
    /// tasks are unaffected.
    pub fn dispatch(
        &self,
        session: &SessionHandle,
        request: Request,
    ) -> Result<Dispatched, DispatchError> {
        let name = request.name();
        let result = self.route(session, request);

        match &result {
            Ok(dispatched) => debug!(
                session_id = %session.id(),
                request = name,
                outcome = ?dispatched,
                "Request dispatched"
            ),
            Err(e) => warn!(
                session_id = %session.id(),
                request = name,
                error = %e,
                "Request rejected"
            ),
        }
        result
    }

    fn route(
        &self,
        session: &SessionHandle,
        request: Request,
    ) -> Result<Dispatched, DispatchError> {
        match request {
            Request::OpenFile(request) => {
                session.open_file(&request)?;
                Ok(Dispatched::Inline)
            }
            Request::CloseFile(request) => {
                session.close_file(request.file_id)?;
                Ok(Dispatched::Inline)
            }
            Request::SetImageChannels(request) => {
                let file_id = request.file_id;
                let outcome = session.push_image_channels(request)?;
                self.drain_if_idle(session, outcome, TaskKind::SetImageChannels(file_id))
            }
            Request::SetImageView(request) => {
                let file_id = request.file_id;
                let outcome = session.push_image_view(request)?;
                self.drain_if_idle(session, outcome, TaskKind::SetImageView(file_id))
            }
            Request::SetCursor(request) => {
                let file_id = request.file_id;
                let outcome = session.push_cursor(request)?;
                self.drain_if_idle(session, outcome, TaskKind::SetCursor(file_id))
            }
            Request::SetHistogramRequirements(request) => {
                session.ensure_file(request.file_id)?;
                self.enqueue(session, TaskKind::SetHistogramRequirements(request))
            }
            Request::CancelHistogram => {
                session.cancel_histograms();
                Ok(Dispatched::Inline)
            }
            Request::AddRequiredTiles(request) => {
                session.ensure_file(request.file_id)?;
                self.enqueue(session, TaskKind::AddRequiredTiles(request))
            }
            Request::SetContourParameters(request) => {
                session.ensure_file(request.file_id)?;
                self.enqueue(session, TaskKind::SetContourParameters(request))
            }
            Request::RegionDataStream(request) => {
                session.ensure_file(request.file_id)?;
                self.enqueue(session, TaskKind::RegionDataStream(request))
            }
            Request::SpectralProfile(request) => {
                session.ensure_file(request.file_id)?;
                self.enqueue(session, TaskKind::SpectralProfile(request))
            }
            Request::SpectralLineRequest(request) => {
                self.enqueue(session, TaskKind::SpectralLineRequest(request))
            }
            Request::StartAnimation(request) => {
                session.ensure_file(request.file_id)?;
                let settings = AnimationSettings::from_request(&request, self.flow_window);
                let generation = session.animation().start(request.file_id, settings)?;
                self.enqueue_step(session, request.file_id, generation)
            }
            Request::AnimationFlowControl(request) => {
                let outcome = session
                    .animation()
                    .notify_flow_event(request.file_id, request.received_frame);
                match outcome {
                    FlowOutcome::Resume {
                        file_id,
                        generation,
                    } => self.enqueue_step(session, file_id, generation),
                    FlowOutcome::Continue | FlowOutcome::Ignored => Ok(Dispatched::Inline),
                }
            }
            Request::StopAnimation(request) => {
                if session.animation().stop().is_err() {
                    debug!(
                        session_id = %session.id(),
                        file_id = %request.file_id,
                        end_frame = request.end_frame,
                        "Stop requested with no animation playing"
                    );
                }
                Ok(Dispatched::Inline)
            }
            Request::Batch { messages } => self.enqueue(session, TaskKind::MultiMessage(messages)),
        }
    }

    fn enqueue(&self, session: &SessionHandle, kind: TaskKind) -> Result<Dispatched, DispatchError> {
        self.submitter.enqueue(Task::new(session, kind))?;
        Ok(Dispatched::Enqueued)
    }

    fn enqueue_step(
        &self,
        session: &SessionHandle,
        file_id: FileId,
        generation: u64,
    ) -> Result<Dispatched, DispatchError> {
        self.enqueue(
            session,
            TaskKind::AnimationStep {
                file_id,
                generation,
            },
        )
    }

    fn drain_if_idle(
        &self,
        session: &SessionHandle,
        outcome: PushOutcome,
        kind: TaskKind,
    ) -> Result<Dispatched, DispatchError> {
        if outcome.needs_drain() {
            let unschedule = kind.clone();
            self.enqueue(session, kind).inspect_err(|_| session.unschedule(&unschedule))
        } else {
            Ok(Dispatched::Coalesced)
        }
    }
}
