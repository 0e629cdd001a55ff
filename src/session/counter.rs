//! Active session counting and RAII guard.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide count of sessions whose driver is running.
static ACTIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// Guard held by a running driver. Dropping it decrements the count and the
/// sessions gauge, so panicking drivers are accounted for too.
pub(super) struct ActiveSession;

impl ActiveSession {
    pub(super) fn new() -> Self {
        ACTIVE_SESSIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_sessions();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        ACTIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_sessions();
    }
}

/// Return the number of sessions currently being driven.
#[must_use]
pub fn active_session_count() -> u64 { ACTIVE_SESSIONS.load(Ordering::Relaxed) }
