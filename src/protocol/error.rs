//! Framing errors raised by the built-in protocols.

use std::io;

use thiserror::Error;

/// Wire-level framing failures.
///
/// These convert into [`io::Error`] with [`io::ErrorKind::InvalidData`] so
/// they flow through [`Protocol::decode`](super::Protocol::decode) unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Frame length prefix indicates size exceeding configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Size announced by the length prefix.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// Zero-length frame received where non-empty is required.
    #[error("empty frame not permitted")]
    EmptyFrame,
}

impl From<FramingError> for io::Error {
    fn from(error: FramingError) -> Self { io::Error::new(io::ErrorKind::InvalidData, error) }
}

impl FramingError {
    /// Recover a [`FramingError`] carried inside an [`io::Error`].
    #[must_use]
    pub fn from_io(error: &io::Error) -> Option<&FramingError> {
        error.get_ref().and_then(|inner| inner.downcast_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion_preserves_framing_error() {
        let err: io::Error = FramingError::OversizedFrame { size: 10, max: 4 }.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(
            FramingError::from_io(&err),
            Some(&FramingError::OversizedFrame { size: 10, max: 4 })
        );
    }
}
