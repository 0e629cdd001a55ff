//! Blocking, pull-style view over a session's inbound bytes.
//!
//! A [`SyncReader`] is obtained from [`Session::open_sync_reader`]. While it
//! is open the session stops decoding and hands every inbound byte to the
//! reader through a one-slot channel. Closing (or dropping) the reader gives
//! the inbound stream back to the decoder.
//!
//! Bytes already handed to the reader but not yet read are discarded on
//! close. Bytes still sitting in the session's read buffer are kept and
//! decoded once the reader is gone.

use std::io;

use bytes::{Buf, Bytes};
use tokio::sync::mpsc;

use crate::session::Session;

/// Blocking reader over a session's inbound bytes.
///
/// Reads block the calling thread, so use the reader from
/// [`tokio::task::spawn_blocking`] or a plain thread.
///
/// # Panics
///
/// Reading on a tokio runtime worker thread panics, because blocking there
/// would stall the session that feeds the reader.
pub struct SyncReader {
    session: Session,
    rx: Option<mpsc::Receiver<Bytes>>,
    current: Bytes,
    remaining: Option<usize>,
}

impl SyncReader {
    pub(crate) fn new(session: Session, rx: mpsc::Receiver<Bytes>, length: Option<usize>) -> Self {
        Self {
            session,
            rx: Some(rx),
            current: Bytes::new(),
            remaining: length,
        }
    }

    /// Session this reader is attached to.
    #[must_use]
    pub fn session(&self) -> &Session { &self.session }

    /// Bytes left before a bounded reader reports end-of-stream, or `None`
    /// for an unbounded reader.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> { self.remaining }

    /// Number of bytes readable without blocking.
    pub fn available(&mut self) -> usize {
        if self.current.is_empty()
            && let Some(rx) = self.rx.as_mut()
            && let Ok(chunk) = rx.try_recv()
        {
            self.current = chunk;
        }
        self.limit(self.current.len())
    }

    /// Read a single byte, or `None` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches [`io::Read`].
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = io::Read::read(self, &mut byte)?;
        Ok((n == 1).then_some(byte[0]))
    }

    /// Detach from the session so another reader may be opened.
    pub fn close(self) {}

    fn limit(&self, n: usize) -> usize { self.remaining.map_or(n, |left| left.min(n)) }

    /// Block until the session hands over more bytes.
    ///
    /// Returns `false` at end-of-stream.
    fn fill(&mut self) -> bool {
        while self.current.is_empty() {
            let Some(rx) = self.rx.as_mut() else {
                return false;
            };
            match rx.blocking_recv() {
                Some(chunk) => self.current = chunk,
                None => {
                    self.rx = None;
                    return false;
                }
            }
        }
        true
    }
}

impl io::Read for SyncReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.remaining == Some(0) || !self.fill() {
            return Ok(0);
        }
        let n = self.limit(buf.len().min(self.current.len()));
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        if let Some(left) = self.remaining.as_mut() {
            *left -= n;
        }
        Ok(n)
    }
}

impl Drop for SyncReader {
    fn drop(&mut self) {
        self.rx = None;
        self.session.release_reader();
    }
}

impl std::fmt::Debug for SyncReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReader")
            .field("session", &self.session.id())
            .field("buffered", &self.current.len())
            .field("remaining", &self.remaining)
            .finish()
    }
}
