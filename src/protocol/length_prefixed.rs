//! Length-prefixed framing with a 4-byte big-endian header.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{FramingError, MAX_FRAME_LENGTH, Protocol, clamp_frame_length};
use crate::session::Session;

/// Length prefix header size (4 bytes for big-endian u32).
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Frames carrying a `u32` big-endian payload length followed by the payload.
///
/// The decoder peeks at the header and consumes nothing until the whole frame
/// is buffered, so a partially received frame survives across reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthPrefixedProtocol {
    max_frame_length: usize,
}

impl LengthPrefixedProtocol {
    /// Construct a protocol accepting payloads up to `max_frame_length` bytes.
    ///
    /// The limit is clamped to
    /// [`MIN_FRAME_LENGTH`](super::MIN_FRAME_LENGTH)..=[`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Return the maximum payload length accepted by this protocol.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Append `payload` to `dst` with its length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedFrame`] (as an [`io::Error`]) when the
    /// payload exceeds the configured maximum and [`FramingError::EmptyFrame`]
    /// when it is empty.
    pub fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> io::Result<()> {
        if payload.is_empty() {
            return Err(FramingError::EmptyFrame.into());
        }
        if payload.len() > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: payload.len(),
                max: self.max_frame_length,
            }
            .into());
        }
        let len = u32::try_from(payload.len()).map_err(|_| FramingError::OversizedFrame {
            size: payload.len(),
            max: self.max_frame_length,
        })?;
        dst.reserve(LENGTH_HEADER_SIZE + payload.len());
        dst.put_u32(len);
        dst.put_slice(payload);
        Ok(())
    }

    fn peek_length(src: &[u8]) -> Option<usize> {
        let header = <[u8; LENGTH_HEADER_SIZE]>::try_from(src.get(..LENGTH_HEADER_SIZE)?).ok()?;
        usize::try_from(u32::from_be_bytes(header)).ok()
    }
}

impl Default for LengthPrefixedProtocol {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl Protocol for LengthPrefixedProtocol {
    type Message = Bytes;

    fn decode(&self, src: &mut BytesMut, _session: &Session) -> io::Result<Option<Bytes>> {
        let Some(len) = Self::peek_length(src) else {
            return Ok(None);
        };
        if len == 0 {
            return Err(FramingError::EmptyFrame.into());
        }
        if len > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: len,
                max: self.max_frame_length,
            }
            .into());
        }
        if src.len() < LENGTH_HEADER_SIZE + len {
            return Ok(None);
        }
        let frame = Bytes::copy_from_slice(&src[LENGTH_HEADER_SIZE..LENGTH_HEADER_SIZE + len]);
        src.advance(LENGTH_HEADER_SIZE + len);
        Ok(Some(frame))
    }

    fn name(&self) -> &'static str { "LengthPrefixedProtocol" }
}
