//! Connected-session bookkeeping.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use super::error::SessionError;
use super::handle::{Release, Session, SessionHandle, SessionId};
use crate::handler::RequestHandler;

/// Owns the connection reference of every connected session.
///
/// A session leaves the registry on disconnect, but it is only destroyed once
/// every task still referencing it has finished. [`live_count`](Self::live_count)
/// counts sessions that have not been destroyed yet, connected or not.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
    /// When the last client left; `None` while any client is connected.
    idle_since: Mutex<Option<Instant>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            live: Arc::new(AtomicUsize::new(0)),
            idle_since: Mutex::new(Some(Instant::now())),
        }
    }

    /// Create a session for a new client. The registry holds its connection
    /// reference until [`disconnect`](Self::disconnect).
    pub fn connect(&self, handler: Arc<dyn RequestHandler>) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = SessionHandle::new(Session::new(id, handler, Arc::clone(&self.live)));

        let mut idle_since = self.idle_since.lock();
        self.sessions.insert(id, handle);
        *idle_since = None;
        drop(idle_since);

        info!(session_id = %id, connected = self.connected_count(), "Client connected");
        id
    }

    /// Acquire a reference to a connected session.
    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Release the connection reference of `id`.
    ///
    /// Running and queued work is told to stop (contexts cancelled, animation
    /// aborted), but the session itself survives until its last task drops
    /// its reference.
    pub fn disconnect(&self, id: SessionId) -> Result<Release, SessionError> {
        let mut idle_since = self.idle_since.lock();
        let (_, handle) = self
            .sessions
            .remove(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        if self.sessions.is_empty() {
            *idle_since = Some(Instant::now());
        }
        drop(idle_since);

        handle.mark_disconnected();
        let in_flight = handle.ref_count() - 1;
        let release = handle.release();
        info!(
            session_id = %id,
            in_flight,
            destroyed = release == Release::Destroyed,
            "Client disconnected"
        );
        Ok(release)
    }

    /// Disconnect every client.
    pub fn disconnect_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.disconnect(*id).is_ok())
            .count()
    }

    /// Abort animations that have waited longer than `limit` for a flow event.
    pub fn abort_stalled_animations(&self, limit: Duration) -> usize {
        let sessions: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions
            .iter()
            .filter(|session| session.animation().abort_if_stalled(limit))
            .count()
    }

    /// Number of connected clients.
    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// How long no client has been connected, or `None` while one is.
    pub fn idle_for(&self) -> Option<Duration> {
        self.idle_since.lock().map(|since| since.elapsed())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("connected", &self.connected_count())
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NoopHandler;

    fn handler() -> Arc<dyn RequestHandler> {
        Arc::new(NoopHandler)
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SessionRegistry::new();
        let a = registry.connect(handler());
        let b = registry.connect(handler());
        assert_ne!(a, b);
        assert_eq!(registry.connected_count(), 2);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_disconnect_without_tasks_destroys() {
        let registry = SessionRegistry::new();
        let id = registry.connect(handler());

        assert_eq!(registry.disconnect(id), Ok(Release::Destroyed));
        assert_eq!(registry.live_count(), 0);
        assert!(registry.get(id).is_none());
        assert_eq!(
            registry.disconnect(id),
            Err(SessionError::UnknownSession(id))
        );
    }

    #[test]
    fn test_disconnect_defers_to_last_task() {
        let registry = SessionRegistry::new();
        let id = registry.connect(handler());
        let task_ref = registry.get(id).unwrap();

        assert_eq!(registry.disconnect(id), Ok(Release::Retained));
        assert_eq!(registry.connected_count(), 0);
        assert_eq!(registry.live_count(), 1);
        assert!(!task_ref.is_connected());

        assert_eq!(task_ref.release(), Release::Destroyed);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_idle_tracking() {
        let registry = SessionRegistry::new();
        assert!(registry.idle_for().is_some());

        let a = registry.connect(handler());
        let b = registry.connect(handler());
        assert!(registry.idle_for().is_none());

        registry.disconnect(a).unwrap();
        assert!(registry.idle_for().is_none());
        registry.disconnect(b).unwrap();
        assert!(registry.idle_for().is_some());
    }

    #[test]
    fn test_disconnect_all() {
        let registry = SessionRegistry::new();
        for _ in 0..3 {
            registry.connect(handler());
        }
        assert_eq!(registry.disconnect_all(), 3);
        assert_eq!(registry.connected_count(), 0);
        assert_eq!(registry.live_count(), 0);
    }
}
