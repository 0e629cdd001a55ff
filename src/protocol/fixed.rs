//! Fixed-size framing.

use std::io;

use bytes::{Buf, Bytes, BytesMut};

use super::Protocol;
use crate::session::Session;

/// Splits the inbound stream into frames of exactly `frame_length` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedLengthProtocol {
    frame_length: usize,
}

impl FixedLengthProtocol {
    /// Create a protocol yielding `frame_length`-byte frames.
    ///
    /// A zero length is raised to one byte.
    #[must_use]
    pub fn new(frame_length: usize) -> Self {
        Self {
            frame_length: frame_length.max(1),
        }
    }

    /// Size of every frame produced by this protocol.
    #[must_use]
    pub fn frame_length(&self) -> usize { self.frame_length }
}

impl Protocol for FixedLengthProtocol {
    type Message = Bytes;

    fn decode(&self, src: &mut BytesMut, _session: &Session) -> io::Result<Option<Bytes>> {
        if src.len() < self.frame_length {
            return Ok(None);
        }
        let frame = Bytes::copy_from_slice(&src[..self.frame_length]);
        src.advance(self.frame_length);
        Ok(Some(frame))
    }

    fn name(&self) -> &'static str { "FixedLengthProtocol" }
}
