//! Registry of live sessions.
//!
//! `SessionRegistry` stores non-owning weak references to sessions so that
//! background tasks can reach a live connection without keeping it alive.
//! Dead entries are pruned opportunistically or lazily at lookup time.

use std::sync::Weak;

use dashmap::DashMap;

use crate::session::{Session, SessionId, SessionInner};

/// Concurrent registry of sessions keyed by [`SessionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<SessionId, Weak<SessionInner>>);

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Retrieve the session for `id` if it is still alive.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let guard = self.0.get(id);
        let inner = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if inner.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        inner.map(Session::from_arc)
    }

    /// Track a newly created session.
    pub fn insert(&self, session: &Session) { self.0.insert(session.id(), session.downgrade()); }

    /// Stop tracking a session, typically on teardown.
    pub fn remove(&self, id: &SessionId) { self.0.remove(id); }

    /// Remove all stale weak references.
    ///
    /// `DashMap::retain` takes per-bucket write locks, so other operations
    /// may contend briefly.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune stale references, then return the IDs of live sessions.
    #[must_use]
    pub fn active_ids(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, weak| {
            if weak.strong_count() > 0 {
                ids.push(*id);
                true
            } else {
                false
            }
        });
        ids
    }

    /// Prune stale references, then return the live sessions.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<Session> {
        let mut sessions = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| {
            if let Some(inner) = weak.upgrade() {
                sessions.push(Session::from_arc(inner));
                true
            } else {
                false
            }
        });
        sessions
    }

    /// Close every live session.
    ///
    /// Returns the number of sessions asked to close.
    pub fn close_all(&self, immediate: bool) -> usize {
        let sessions = self.active_sessions();
        for session in &sessions {
            session.close(immediate);
        }
        sessions.len()
    }

    /// Number of tracked entries, including ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
