//! Pluggable frame decoders driven by the session read pipeline.
//!
//! A [`Protocol`] inspects the bytes accumulated in a session's read buffer
//! and either extracts one whole message or reports that more data is needed.
//! The engine calls [`Protocol::decode`] repeatedly until the buffer is
//! drained or the decoder asks for more input.
//!
//! Two simple framings ship with the crate: [`FixedLengthProtocol`] and
//! [`LengthPrefixedProtocol`]. Both copy frames out of the read buffer so the
//! buffer stays exclusively owned by its session.

use std::io;

use bytes::BytesMut;

use crate::session::Session;

pub mod error;
mod fixed;
mod length_prefixed;

pub use error::FramingError;
pub use fixed::FixedLengthProtocol;
pub use length_prefixed::{LENGTH_HEADER_SIZE, LengthPrefixedProtocol};

/// Minimum frame length accepted by [`LengthPrefixedProtocol`].
pub const MIN_FRAME_LENGTH: usize = 1;

/// Maximum frame length accepted by [`LengthPrefixedProtocol`] (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Decoder turning accumulated bytes into messages.
///
/// # Contract
///
/// - Return `Ok(Some(message))` after consuming exactly the bytes of one message from `src`.
/// - Return `Ok(None)` when `src` does not yet hold a whole message. Bytes may stay in `src`
///   untouched; they are preserved across reads.
/// - Return `Err` on unrecoverable malformed input. The session reports a decode error and
///   tears the connection down.
///
/// A decoder that keeps returning `Ok(None)` while the buffer fills to
/// capacity is treated as broken: the session reports
/// [`SessionError::BufferExhausted`](crate::SessionError::BufferExhausted)
/// naming [`Protocol::name`] and closes.
pub trait Protocol: Send + Sync + 'static {
    /// Message produced by a successful decode.
    type Message: Send + 'static;

    /// Attempt to decode one message from the front of `src`.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] when the bytes cannot be framed.
    fn decode(&self, src: &mut BytesMut, session: &Session) -> io::Result<Option<Self::Message>>;

    /// Name reported in diagnostics about this decoder.
    fn name(&self) -> &'static str { std::any::type_name::<Self>() }
}
