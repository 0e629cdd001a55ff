//! Session lifecycle state machine.

use std::sync::atomic::Ordering;

use tracing::debug;

use super::Session;
use crate::handler::StateEvent;

/// Lifecycle state of a session.
///
/// Transitions only move forward: `Enabled` → `Closing` → `Closed`, or
/// straight from `Enabled` to `Closed`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStatus {
    /// Reading and writing normally.
    Enabled = 0,
    /// Close requested; queued writes are still draining.
    Closing = 1,
    /// Terminal.
    Closed = 2,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Enabled,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl Session {
    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.inner.status.load(Ordering::SeqCst))
    }

    /// Returns `true` once a close has been requested.
    #[must_use]
    pub fn is_invalid(&self) -> bool { self.status() != SessionStatus::Enabled }

    /// Close the session.
    ///
    /// An immediate close discards queued writes and tears the connection
    /// down at once. A graceful close lets queued and in-flight writes drain
    /// first; if nothing is pending it behaves like an immediate close.
    ///
    /// Only the first call has an effect. Calls may race from any number of
    /// threads. [`StateEvent::Closed`] is reported once, after the driver has
    /// released the session's buffers and shut the stream down.
    pub fn close(&self, immediate: bool) {
        if immediate {
            self.close_now();
        } else {
            self.close_gracefully();
        }
    }

    pub(crate) fn close_now(&self) {
        let previous = self
            .inner
            .status
            .fetch_max(SessionStatus::Closed as u8, Ordering::SeqCst);
        if previous == SessionStatus::Closed as u8 {
            return;
        }
        debug!(id = %self.id(), "session closed immediately");
        for buffer in self.inner.outbound.close() {
            self.release(buffer);
        }
        // Dropping the feed ends a blocked synchronous read; the lease itself
        // stays with the reader until it is closed.
        self.reader_slot().feed = None;
        self.inner.shutdown.cancel();
    }

    fn close_gracefully(&self) {
        if self
            .inner
            .status
            .compare_exchange(
                SessionStatus::Enabled as u8,
                SessionStatus::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        if !self.inner.write_in_flight.load(Ordering::SeqCst) && self.inner.outbound.is_empty() {
            self.close_now();
            return;
        }
        debug!(id = %self.id(), pending = self.pending_writes(), "session closing");
        self.emit(StateEvent::Closing, None);
        self.inner.outbound.wake();
        self.inner.read_wake.notify_one();
    }

    pub(super) fn mark_eof(&self) { self.inner.eof.store(true, Ordering::Release); }

    pub(super) fn set_write_in_flight(&self, in_flight: bool) {
        self.inner.write_in_flight.store(in_flight, Ordering::SeqCst);
    }
}
