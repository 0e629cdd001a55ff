//! Instrumentation hooks around session I/O.
//!
//! A [`Monitor`] observes every read and write a session issues. Each read is
//! bracketed by exactly one `before_read`/`after_read` pair and each write by
//! one `before_write`/`after_write` pair, which makes the single outstanding
//! read and single in-flight write per session observable.

use crate::{
    metrics::{self, Direction},
    session::Session,
};

/// Hooks invoked around transport reads and writes.
///
/// All methods default to no-ops.
pub trait Monitor: Send + Sync + 'static {
    /// A read is about to be issued with `capacity` bytes of free space.
    fn before_read(&self, _session: &Session, _capacity: usize) {}

    /// A read finished with `bytes` bytes.
    ///
    /// Zero means end-of-stream, or that the read was abandoned because the
    /// session closed. Reads interrupted by a state change on a live session
    /// stay outstanding and are not reported here.
    fn after_read(&self, _session: &Session, _bytes: usize) {}

    /// A write of `bytes` bytes is about to be issued.
    fn before_write(&self, _session: &Session, _bytes: usize) {}

    /// A write finished after accepting `bytes` bytes.
    fn after_write(&self, _session: &Session, _bytes: usize) {}
}

/// Monitor that records transferred bytes through the [`metrics`] helpers.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsMonitor;

impl Monitor for MetricsMonitor {
    fn after_read(&self, _session: &Session, bytes: usize) {
        if bytes > 0 {
            metrics::add_bytes(Direction::Inbound, bytes);
        }
    }

    fn after_write(&self, _session: &Session, bytes: usize) {
        metrics::add_bytes(Direction::Outbound, bytes);
    }
}
