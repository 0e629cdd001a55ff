//! Canonical error types for the session engine.
//!
//! [`SessionError`] classifies every failure a session can observe. Each
//! variant maps onto exactly one [`StateEvent`](crate::handler::StateEvent)
//! reported to the handler, so callers only ever see a closed connection plus a
//! classified event.

use std::io;

use thiserror::Error;

/// Boxed error returned by handlers from message processing.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a session or reported to its handler.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// The protocol rejected the inbound byte stream.
    ///
    /// Fatal: a desynchronised stream cannot be recovered.
    #[error("protocol {protocol} failed to decode inbound bytes: {source}")]
    Decode {
        /// Name of the protocol that raised the error.
        protocol: &'static str,
        /// Error returned by the decoder.
        #[source]
        source: io::Error,
    },

    /// The read buffer filled up without the protocol producing a frame.
    ///
    /// Fatal: the decoder never completes a frame and never consumes bytes.
    #[error("protocol {protocol} filled the {capacity}-byte read buffer without producing a frame")]
    BufferExhausted {
        /// Name of the offending protocol.
        protocol: &'static str,
        /// Capacity of the exhausted read buffer.
        capacity: usize,
    },

    /// The handler failed to process one decoded message.
    ///
    /// Recoverable: the session keeps decoding subsequent messages.
    #[error("handler failed to process message: {0}")]
    Process(#[source] BoxError),

    /// Reading from the transport failed.
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing to the transport failed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// A synchronous reader is already open on this session.
    #[error("a synchronous reader is already open on this session")]
    ReaderAlreadyOpen,

    /// The session has already been closed.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Returns `true` if this error tears the connection down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Process(_) | Self::ReaderAlreadyOpen)
    }

    /// Short label used for the `kind` metric dimension.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } | Self::BufferExhausted { .. } => "decode",
            Self::Process(_) => "process",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::ReaderAlreadyOpen => "usage",
            Self::Closed => "closed",
        }
    }
}

/// Errors returned when a buffer cannot be added to the outbound queue.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity.
    #[error("outbound queue full")]
    Full,
    /// The session is closed and no longer accepts writes.
    #[error("outbound queue closed")]
    Closed,
}
