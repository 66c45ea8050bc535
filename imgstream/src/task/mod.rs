//! Session-bound units of work executed by the worker pool.
//!
//! A [`Task`] is a closed variant ([`TaskKind`]) plus a counted reference to
//! the session it works for. Building a task acquires exactly one session
//! reference; dropping it releases that reference on every path, including
//! tasks abandoned at pool shutdown and tasks whose handler panicked.

mod kind;

pub use kind::TaskKind;

use tracing::{debug, warn};

use crate::animation::FrameStep;
use crate::handler::HandlerError;
use crate::pool::Runnable;
use crate::session::SessionHandle;

/// One unit of deferred work bound to a session.
#[derive(Debug)]
pub struct Task {
    session: SessionHandle,
    kind: TaskKind,
}

impl Task {
    /// Create a task holding its own reference to `session`.
    pub fn new(session: &SessionHandle, kind: TaskKind) -> Self {
        Self {
            session: session.clone(),
            kind,
        }
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Run the task on the current thread.
    ///
    /// Returns the follow-up task for animation playback while frames are
    /// still being produced. Work for a disconnected session is skipped.
    pub fn execute(self) -> Option<Task> {
        let session = &self.session;
        if !session.is_connected() {
            debug!(
                session_id = %session.id(),
                task = self.kind.name(),
                "Skipping task for disconnected session"
            );
            return None;
        }

        let id = session.id();
        let handler = session.handler();
        let name = self.kind.name();

        match &self.kind {
            TaskKind::MultiMessage(messages) => {
                for message in messages {
                    match handler.on_batched_message(id, message) {
                        Ok(()) => {}
                        Err(HandlerError::Malformed { reason, .. }) => {
                            warn!(
                                session_id = %id,
                                kind = %message.kind,
                                request_id = message.request_id,
                                reason = %reason,
                                "Dropping malformed batched message"
                            );
                        }
                        Err(e) => session.report(name, Err(e)),
                    }
                }
            }
            TaskKind::SetImageChannels(file_id) => {
                session.execute_image_channels(*file_id);
            }
            TaskKind::SetImageView(file_id) => {
                session.execute_image_view(*file_id);
            }
            TaskKind::SetCursor(file_id) => {
                session.execute_cursor(*file_id);
            }
            TaskKind::SetHistogramRequirements(request) => {
                let context = session.begin_histogram();
                session.report(name, handler.on_histogram(id, request, &context));
                if context.is_cancelled() {
                    debug!(session_id = %id, file_id = %request.file_id, "Histogram cancelled");
                }
            }
            TaskKind::AnimationStep {
                file_id,
                generation,
            } => match session.animation().next_frame(*generation) {
                FrameStep::Produce(frame) => {
                    session.report(name, handler.on_animation_frame(id, *file_id, frame));
                    return Some(self);
                }
                FrameStep::Wait | FrameStep::Finished | FrameStep::Stale => {}
            },
            TaskKind::AddRequiredTiles(request) => {
                session.report(name, handler.on_add_required_tiles(id, request));
            }
            TaskKind::SetContourParameters(request) => {
                session.report(name, handler.on_set_contour_parameters(id, request));
            }
            TaskKind::RegionDataStream(request) => {
                session.report(
                    name,
                    handler.on_region_data_stream(id, request, session.base_context()),
                );
            }
            TaskKind::SpectralProfile(request) => {
                session.report(
                    name,
                    handler.on_spectral_profile(id, request, session.base_context()),
                );
            }
            TaskKind::SpectralLineRequest(request) => {
                session.report(name, handler.on_spectral_line_request(id, request));
            }
        }
        None
    }
}

impl Runnable for Task {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn run(self) -> Option<Self> {
        self.execute()
    }
}
