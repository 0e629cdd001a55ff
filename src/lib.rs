#![doc(html_root_url = "https://docs.rs/wiresession/latest")]
//! Public API for the `wiresession` library.
//!
//! This crate provides an asynchronous per-connection session engine: a read
//! pipeline that frames and dispatches inbound messages, a write pipeline
//! that drains an ordered outbound queue with one write in flight, a
//! monotonic close state machine and a blocking reader for call sites that
//! prefer pull-style input. Wire formats, business logic and buffer
//! allocation plug in through the [`Protocol`], [`Handler`] and
//! [`BufferPool`] traits.

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod monitor;
pub mod outbound;
pub mod panic;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod sync_reader;

pub use buffer::{BufferPool, FixedBufferPool};
pub use client::connect;
pub use config::SessionConfig;
pub use error::{BoxError, EnqueueError, SessionError};
pub use handler::{Handler, StateEvent};
pub use metrics::{BYTES_TOTAL, Direction, ERRORS_TOTAL, MESSAGES_PROCESSED, SESSIONS_ACTIVE};
pub use monitor::{MetricsMonitor, Monitor};
pub use outbound::OutboundQueue;
pub use protocol::{FixedLengthProtocol, FramingError, LengthPrefixedProtocol, Protocol};
pub use registry::SessionRegistry;
pub use server::{BackoffConfig, ServerError, SessionServer};
pub use session::{
    Session,
    SessionBuilder,
    SessionDriver,
    SessionId,
    SessionStatus,
    active_session_count,
};
pub use sync_reader::SyncReader;
