//! Per-client session state and its shared-ownership handle.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::context::SessionContext;
use super::error::SessionError;
use crate::animation::AnimationController;
use crate::coalesce::{CoalescingQueue, PushOutcome};
use crate::handler::{HandlerError, RequestHandler};
use crate::request::{FileId, OpenFile, SetCursor, SetImageChannels, SetImageView};
use crate::task::TaskKind;

/// Opaque, never-reused session identifier.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping for one open file.
#[derive(Debug, Clone)]
struct OpenedFile {
    path: String,
}

/// Per-client state shared by the connection and every task referencing it.
///
/// Sessions are only reachable through a [`SessionHandle`]. The session is
/// destroyed when the last handle is dropped, whether that is the
/// connection's own handle (released on disconnect) or the last in-flight
/// task.
pub struct Session {
    id: SessionId,
    handler: Arc<dyn RequestHandler>,
    files: DashMap<FileId, OpenedFile>,
    channels: CoalescingQueue<SetImageChannels>,
    views: CoalescingQueue<SetImageView>,
    cursors: CoalescingQueue<SetCursor>,
    animation: AnimationController,
    histogram_context: Mutex<Arc<SessionContext>>,
    base_context: SessionContext,
    connected: AtomicBool,
    created_at: Instant,
    live: Arc<AtomicUsize>,
}

impl Session {
    pub(super) fn new(
        id: SessionId,
        handler: Arc<dyn RequestHandler>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            id,
            handler,
            files: DashMap::new(),
            channels: CoalescingQueue::new("SET_IMAGE_CHANNELS"),
            views: CoalescingQueue::new("SET_IMAGE_VIEW"),
            cursors: CoalescingQueue::new("SET_CURSOR"),
            animation: AnimationController::new(),
            histogram_context: Mutex::new(Arc::new(SessionContext::new())),
            base_context: SessionContext::new(),
            connected: AtomicBool::new(true),
            created_at: Instant::now(),
            live,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }

    /// Whether the client is still connected.
    ///
    /// Tasks that start after a disconnect skip their work.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the client gone and cancel everything that polls for it.
    pub(super) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.base_context.cancel();
        self.cancel_histograms();
        self.animation
            .abort(crate::animation::CancelReason::Disconnected);
    }

    pub fn animation(&self) -> &AnimationController {
        &self.animation
    }

    /// Cancellation flag shared by the histograms currently running.
    pub fn histogram_context(&self) -> Arc<SessionContext> {
        Arc::clone(&self.histogram_context.lock())
    }

    /// Context for a histogram about to start.
    ///
    /// Histograms started before the last cancellation keep the cancelled
    /// context; a new one is installed for this and later runs. After a
    /// disconnect the cancelled context is returned as is.
    pub fn begin_histogram(&self) -> Arc<SessionContext> {
        let mut current = self.histogram_context.lock();
        if current.is_cancelled() && self.is_connected() {
            *current = Arc::new(SessionContext::new());
        }
        Arc::clone(&current)
    }

    /// Cancel every histogram running or started since the last cancellation.
    pub fn cancel_histograms(&self) {
        self.histogram_context.lock().cancel();
    }

    /// Cancellation flag for all other long computations; set on disconnect.
    pub fn base_context(&self) -> &SessionContext {
        &self.base_context
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Register a file and let the handler load it.
    ///
    /// If the handler fails the file is unregistered again.
    pub fn open_file(&self, request: &OpenFile) -> Result<(), SessionError> {
        let file_id = request.file_id;
        match self.files.entry(file_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(SessionError::FileAlreadyOpen(file_id));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(OpenedFile {
                    path: request.path.clone(),
                });
            }
        }
        self.channels.open(file_id);
        self.views.open(file_id);
        self.cursors.open(file_id);

        if let Err(e) = self.handler.on_open_file(self.id, request) {
            self.forget_file(file_id);
            return Err(e.into());
        }

        info!(
            session_id = %self.id,
            file_id = %file_id,
            path = %request.path,
            "File opened"
        );
        Ok(())
    }

    /// Unregister a file, discard its pending coalesced requests and cancel an
    /// animation playing it.
    ///
    /// Executions already running for the file finish normally.
    pub fn close_file(&self, file_id: FileId) -> Result<(), SessionError> {
        if !self.forget_file(file_id) {
            return Err(SessionError::UnknownFile(file_id));
        }
        self.animation.cancel_for_file(file_id);
        self.handler.on_close_file(self.id, file_id)?;

        info!(session_id = %self.id, file_id = %file_id, "File closed");
        Ok(())
    }

    fn forget_file(&self, file_id: FileId) -> bool {
        let removed = self.files.remove(&file_id).is_some();
        self.channels.close(file_id);
        self.views.close(file_id);
        self.cursors.close(file_id);
        removed
    }

    pub fn has_file(&self, file_id: FileId) -> bool {
        self.files.contains_key(&file_id)
    }

    /// Fail with [`SessionError::UnknownFile`] unless `file_id` is open.
    pub fn ensure_file(&self, file_id: FileId) -> Result<(), SessionError> {
        if self.has_file(file_id) {
            Ok(())
        } else {
            Err(SessionError::UnknownFile(file_id))
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Path the file was opened from.
    pub fn file_path(&self, file_id: FileId) -> Option<String> {
        self.files.get(&file_id).map(|f| f.path.clone())
    }

    // =========================================================================
    // Coalesced requests
    // =========================================================================

    /// Record the latest channel change for a file.
    pub fn push_image_channels(&self, request: SetImageChannels) -> Result<PushOutcome, SessionError> {
        Ok(self.channels.push(request.file_id, request)?)
    }

    /// Record the latest view change for a file.
    pub fn push_image_view(&self, request: SetImageView) -> Result<PushOutcome, SessionError> {
        Ok(self.views.push(request.file_id, request)?)
    }

    /// Record the latest cursor position for a file.
    pub fn push_cursor(&self, request: SetCursor) -> Result<PushOutcome, SessionError> {
        Ok(self.cursors.push(request.file_id, request)?)
    }

    /// Withdraw the drain scheduled for a coalesced task that could not be
    /// enqueued, so the next push for that file schedules again.
    pub fn unschedule(&self, kind: &TaskKind) {
        match *kind {
            TaskKind::SetImageChannels(file_id) => self.channels.cancel_schedule(file_id),
            TaskKind::SetImageView(file_id) => self.views.cancel_schedule(file_id),
            TaskKind::SetCursor(file_id) => self.cursors.cancel_schedule(file_id),
            _ => {}
        }
    }

    /// Run the pending channel change of `file_id` and any newer one that
    /// arrives meanwhile. Returns the number of handler invocations.
    pub fn execute_image_channels(&self, file_id: FileId) -> usize {
        self.drain_queue(&self.channels, file_id, |handler, id, request| {
            handler.on_set_image_channels(id, request)
        })
    }

    pub fn execute_image_view(&self, file_id: FileId) -> usize {
        self.drain_queue(&self.views, file_id, |handler, id, request| {
            handler.on_set_image_view(id, request)
        })
    }

    pub fn execute_cursor(&self, file_id: FileId) -> usize {
        self.drain_queue(&self.cursors, file_id, |handler, id, request| {
            handler.on_set_cursor(id, request)
        })
    }

    fn drain_queue<R, F>(&self, queue: &CoalescingQueue<R>, file_id: FileId, call: F) -> usize
    where
        F: Fn(&dyn RequestHandler, SessionId, &R) -> Result<(), HandlerError>,
    {
        let drained = queue.drain(file_id, |request| {
            self.report(queue.name(), call(self.handler.as_ref(), self.id, &request));
        });

        match drained {
            Ok(executed) => executed,
            Err(_) => {
                debug!(
                    session_id = %self.id,
                    file_id = %file_id,
                    queue = queue.name(),
                    "File closed before coalesced request ran"
                );
                0
            }
        }
    }

    /// Log a failed handler call. The request is dropped either way.
    pub fn report(&self, task: &'static str, result: Result<(), HandlerError>) {
        if let Err(e) = result {
            warn!(session_id = %self.id, task, error = %e, "Request failed");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("files", &self.files.len())
            .field("connected", &self.is_connected())
            .field("animation", &self.animation.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        info!(
            session_id = %self.id,
            lifetime_secs = self.created_at.elapsed().as_secs(),
            "Session destroyed"
        );
    }
}

/// Outcome of releasing a [`SessionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// This was the last reference; the session has been destroyed.
    Destroyed,
    /// Other references remain.
    Retained,
}

/// Counted reference to a [`Session`].
///
/// Cloning acquires a reference and dropping releases it. The session is
/// destroyed by whichever release observes the count reaching zero, and only
/// one release can observe that.
#[derive(Clone)]
pub struct SessionHandle(Arc<Session>);

impl SessionHandle {
    pub(super) fn new(session: Session) -> Self {
        Self(Arc::new(session))
    }

    /// Release this reference, reporting whether it was the last one.
    pub fn release(self) -> Release {
        match Arc::into_inner(self.0) {
            Some(session) => {
                drop(session);
                Release::Destroyed
            }
            None => Release::Retained,
        }
    }

    /// Number of live references, including this one.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles refer to the same session.
    pub fn ptr_eq(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionHandle").field(&self.0.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NoopHandler;
    use parking_lot::Mutex;
    use std::thread;

    // =========================================================================
    // Test helpers
    // =========================================================================

    fn new_handle(live: &Arc<AtomicUsize>) -> SessionHandle {
        SessionHandle::new(Session::new(
            SessionId(1),
            Arc::new(NoopHandler),
            Arc::clone(live),
        ))
    }

    fn open_request(file_id: i32) -> OpenFile {
        OpenFile {
            file_id: FileId(file_id),
            path: format!("cube-{}.fits", file_id),
            request_id: 0,
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        channels: Mutex<Vec<i32>>,
        fail_open: bool,
    }

    impl RequestHandler for RecordingHandler {
        fn on_open_file(&self, _: SessionId, _: &OpenFile) -> Result<(), HandlerError> {
            if self.fail_open {
                Err(HandlerError::Failed("unreadable".into()))
            } else {
                Ok(())
            }
        }

        fn on_set_image_channels(
            &self,
            _: SessionId,
            request: &SetImageChannels,
        ) -> Result<(), HandlerError> {
            self.channels.lock().push(request.channel);
            Ok(())
        }
    }

    fn channels(file_id: i32, channel: i32) -> SetImageChannels {
        SetImageChannels {
            file_id: FileId(file_id),
            channel,
            stokes: 0,
            required_tiles: vec![],
            request_id: 0,
        }
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    #[test]
    fn test_last_release_destroys() {
        let live = Arc::new(AtomicUsize::new(0));
        let handle = new_handle(&live);
        let task_ref = handle.clone();
        assert_eq!(handle.ref_count(), 2);
        assert_eq!(live.load(Ordering::SeqCst), 1);

        assert_eq!(handle.release(), Release::Retained);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(task_ref.release(), Release::Destroyed);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_releases_destroy_exactly_once() {
        for _ in 0..20 {
            let live = Arc::new(AtomicUsize::new(0));
            let handle = new_handle(&live);
            let destroyed = Arc::new(AtomicUsize::new(0));

            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let task_ref = handle.clone();
                    let destroyed = Arc::clone(&destroyed);
                    thread::spawn(move || {
                        if task_ref.release() == Release::Destroyed {
                            destroyed.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            if handle.release() == Release::Destroyed {
                destroyed.fetch_add(1, Ordering::SeqCst);
            }
            for worker in workers {
                worker.join().unwrap();
            }

            assert_eq!(destroyed.load(Ordering::SeqCst), 1);
            assert_eq!(live.load(Ordering::SeqCst), 0);
        }
    }

    // =========================================================================
    // Files
    // =========================================================================

    #[test]
    fn test_open_and_close_file() {
        let live = Arc::new(AtomicUsize::new(0));
        let session = new_handle(&live);

        session.open_file(&open_request(7)).unwrap();
        assert!(session.has_file(FileId(7)));
        assert_eq!(session.file_path(FileId(7)).as_deref(), Some("cube-7.fits"));
        assert_eq!(
            session.open_file(&open_request(7)),
            Err(SessionError::FileAlreadyOpen(FileId(7)))
        );

        session.close_file(FileId(7)).unwrap();
        assert!(!session.has_file(FileId(7)));
        assert_eq!(
            session.close_file(FileId(7)),
            Err(SessionError::UnknownFile(FileId(7)))
        );
        assert_eq!(
            session.push_image_channels(channels(7, 1)),
            Err(SessionError::UnknownFile(FileId(7)))
        );
    }

    #[test]
    fn test_failed_open_unregisters_file() {
        let live = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(RecordingHandler {
            fail_open: true,
            ..Default::default()
        });
        let session = SessionHandle::new(Session::new(SessionId(2), handler, live));

        let result = session.open_file(&open_request(1));
        assert!(matches!(result, Err(SessionError::Handler(_))));
        assert!(!session.has_file(FileId(1)));
        assert_eq!(session.file_count(), 0);
    }

    #[test]
    fn test_channel_burst_executes_latest() {
        let live = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(RecordingHandler::default());
        let session = SessionHandle::new(Session::new(
            SessionId(3),
            Arc::clone(&handler) as Arc<dyn RequestHandler>,
            live,
        ));
        session.open_file(&open_request(7)).unwrap();

        assert_eq!(session.push_image_channels(channels(7, 1)), Ok(PushOutcome::Schedule));
        assert_eq!(session.push_image_channels(channels(7, 2)), Ok(PushOutcome::Superseded));
        assert_eq!(session.push_image_channels(channels(7, 3)), Ok(PushOutcome::Superseded));

        assert_eq!(session.execute_image_channels(FileId(7)), 1);
        assert_eq!(*handler.channels.lock(), vec![3]);
    }

    #[test]
    fn test_execute_after_close_is_noop() {
        let live = Arc::new(AtomicUsize::new(0));
        let session = new_handle(&live);
        session.open_file(&open_request(4)).unwrap();
        session.push_cursor(SetCursor {
            file_id: FileId(4),
            x: 1.0,
            y: 2.0,
            request_id: 0,
        })
        .unwrap();

        session.close_file(FileId(4)).unwrap();
        assert_eq!(session.execute_cursor(FileId(4)), 0);
    }

    #[test]
    fn test_disconnect_cancels_contexts() {
        let live = Arc::new(AtomicUsize::new(0));
        let session = new_handle(&live);
        assert!(session.is_connected());

        session.mark_disconnected();
        assert!(!session.is_connected());
        assert!(session.base_context().is_cancelled());
        assert!(session.histogram_context().is_cancelled());
        assert!(session.begin_histogram().is_cancelled());
    }

    #[test]
    fn test_new_histogram_does_not_clear_running_cancellation() {
        let live = Arc::new(AtomicUsize::new(0));
        let session = new_handle(&live);

        let running = session.begin_histogram();
        session.cancel_histograms();
        assert!(running.is_cancelled());

        let next = session.begin_histogram();
        assert!(!next.is_cancelled());
        assert!(running.is_cancelled());

        // Two histograms started without a cancel in between share a context.
        let concurrent = session.begin_histogram();
        assert!(Arc::ptr_eq(&next, &concurrent));
        session.cancel_histograms();
        assert!(next.is_cancelled() && concurrent.is_cancelled());
    }

    #[test]
    fn test_unschedule_lets_next_push_schedule() {
        let live = Arc::new(AtomicUsize::new(0));
        let session = new_handle(&live);
        session.open_file(&open_request(5)).unwrap();

        assert_eq!(session.push_image_channels(channels(5, 1)), Ok(PushOutcome::Schedule));
        assert_eq!(session.push_image_channels(channels(5, 2)), Ok(PushOutcome::Superseded));
        session.unschedule(&TaskKind::SetImageChannels(FileId(5)));
        assert_eq!(session.push_image_channels(channels(5, 3)), Ok(PushOutcome::Schedule));
    }
}
