//! Metric helpers for `wiresession`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. Without the
//! `metrics` feature every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active sessions.
pub const SESSIONS_ACTIVE: &str = "wiresession_sessions_active";
/// Name of the counter tracking bytes moved through sessions.
pub const BYTES_TOTAL: &str = "wiresession_bytes_total";
/// Name of the counter tracking messages dispatched to handlers.
pub const MESSAGES_PROCESSED: &str = "wiresession_messages_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "wiresession_errors_total";

/// Direction of data flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Bytes read from the peer.
    Inbound,
    /// Bytes written to the peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record `bytes` transferred in `direction`.
pub fn add_bytes(direction: Direction, bytes: usize) {
    #[cfg(feature = "metrics")]
    counter!(BYTES_TOTAL, "direction" => direction.as_str())
        .increment(u64::try_from(bytes).unwrap_or(u64::MAX));
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, bytes);
}

/// Record a message dispatched to a handler.
pub fn inc_messages() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_PROCESSED).increment(1);
}

/// Record an error occurrence of the given kind.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
