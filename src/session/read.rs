//! Read pipeline: fill, decode, dispatch.
//!
//! One iteration fills the read buffer with a single read, then decodes and
//! dispatches every whole message it holds before the next read is issued.
//! While a [`SyncReader`](crate::SyncReader) is open, buffered bytes are
//! handed to it instead of the decoder.

use std::{io, sync::Arc};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{ReaderFeed, Session, SessionStatus};
use crate::{
    error::SessionError,
    handler::{Handler, StateEvent},
    metrics,
    protocol::Protocol,
};

/// Outcome of one decode pass.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// The buffer needs more bytes.
    ReadMore,
    /// Session state changed under the pass; start over without reading.
    Restart,
    /// Input is finished.
    Stop,
}

/// Outcome of one handoff to a synchronous reader.
enum Handoff {
    Delivered,
    NeedData,
    Detached,
}

enum Filled {
    Bytes(usize),
    Eof,
    Interrupted,
    Cancelled,
    Failed(io::Error),
}

pub(super) struct ReadPipeline<P, H, R> {
    session: Session,
    protocol: Arc<P>,
    handler: Arc<H>,
    reader: R,
    buffer: BytesMut,
    capacity: usize,
    forward: Option<ReaderFeed>,
    /// A read has been announced to the monitor and not yet completed.
    read_armed: bool,
}

impl<P, H, R> ReadPipeline<P, H, R>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
    R: AsyncRead + Unpin,
{
    pub(super) fn new(
        session: Session,
        protocol: Arc<P>,
        handler: Arc<H>,
        reader: R,
        mut buffer: BytesMut,
        capacity: usize,
    ) -> Self {
        buffer.clear();
        buffer.reserve(capacity);
        Self {
            session,
            protocol,
            handler,
            reader,
            buffer,
            capacity,
            forward: None,
            read_armed: false,
        }
    }

    pub(super) fn into_parts(self) -> (R, BytesMut) { (self.reader, self.buffer) }

    /// Run until input ends or the session closes.
    ///
    /// Fatal decode failures close the session immediately and are returned.
    pub(super) async fn run(&mut self) -> Result<(), SessionError> {
        let result = self.drive().await;
        self.forward = None;
        if self.read_armed {
            self.read_armed = false;
            if let Some(monitor) = self.session.monitor() {
                monitor.after_read(&self.session, 0);
            }
        }
        if result.is_err() {
            self.session.close_now();
        }
        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        loop {
            self.attach_reader();
            if self.forward.is_some() {
                match self.feed_reader().await {
                    Handoff::Delivered | Handoff::Detached => continue,
                    Handoff::NeedData => {}
                }
            } else {
                match self.pump()? {
                    Step::Restart => continue,
                    Step::Stop => return Ok(()),
                    Step::ReadMore => {}
                }
            }
            if !self.fill().await {
                return Ok(());
            }
        }
    }

    /// Decode and dispatch every whole message currently buffered.
    fn pump(&mut self) -> Result<Step, SessionError> {
        let generation = self.session.generation();
        while !self.buffer.is_empty() && self.session.status() == SessionStatus::Enabled {
            let message = match self.protocol.decode(&mut self.buffer, &self.session) {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(source) => {
                    let error = SessionError::Decode {
                        protocol: self.protocol.name(),
                        source,
                    };
                    self.session.report(StateEvent::DecodeError, &error);
                    return Err(error);
                }
            };
            metrics::inc_messages();
            if let Err(source) = self.handler.process(&self.session, message) {
                self.session
                    .report(StateEvent::ProcessError, &SessionError::Process(source));
            }
            if self.session.generation() != generation {
                return Ok(Step::Restart);
            }
        }

        let status = self.session.status();
        if self.session.is_eof() || status == SessionStatus::Closing {
            self.session.close(false);
            self.session.emit(StateEvent::InputShutdown, None);
            return Ok(Step::Stop);
        }
        if status == SessionStatus::Closed {
            return Ok(Step::Stop);
        }

        self.session.flush();
        self.compact();
        if self.buffer.len() >= self.capacity {
            let error = SessionError::BufferExhausted {
                protocol: self.protocol.name(),
                capacity: self.capacity,
            };
            self.session.report(StateEvent::DecodeError, &error);
            return Err(error);
        }
        Ok(Step::ReadMore)
    }

    /// Move undecoded bytes to the front and restore free space.
    fn compact(&mut self) {
        let len = self.buffer.len();
        if len < self.capacity {
            self.buffer.reserve(self.capacity - len);
        }
    }

    /// Issue one read into the free space of the buffer.
    ///
    /// A read interrupted by a state change is re-issued on the next call
    /// without a second `before_read`, so the monitor sees one read.
    ///
    /// Returns `false` once reading must stop.
    async fn fill(&mut self) -> bool {
        let spare = self.capacity.saturating_sub(self.buffer.len());
        if !self.read_armed {
            if let Some(monitor) = self.session.monitor() {
                monitor.before_read(&self.session, spare);
            }
            self.read_armed = true;
        }

        let inner = &self.session.inner;
        let mut window = (&mut self.buffer).limit(spare);
        let filled = tokio::select! {
            biased;
            () = inner.shutdown.cancelled() => Filled::Cancelled,
            () = inner.read_wake.notified() => Filled::Interrupted,
            res = self.reader.read_buf(&mut window) => match res {
                Ok(0) => Filled::Eof,
                Ok(n) => Filled::Bytes(n),
                Err(e) => Filled::Failed(e),
            },
        };

        if matches!(filled, Filled::Interrupted) {
            return true;
        }
        self.read_armed = false;
        let n = match filled {
            Filled::Bytes(n) => n,
            _ => 0,
        };
        if let Some(monitor) = self.session.monitor() {
            monitor.after_read(&self.session, n);
        }

        match filled {
            Filled::Bytes(_) | Filled::Interrupted => true,
            Filled::Eof => {
                self.session.mark_eof();
                true
            }
            Filled::Cancelled => false,
            Filled::Failed(source) => {
                self.session
                    .report(StateEvent::ReadError, &SessionError::Read(source));
                self.session.close(false);
                false
            }
        }
    }

    /// Pick up a reader opened since the last iteration and forget one that
    /// has gone away.
    fn attach_reader(&mut self) {
        if let Some(feed) = self.session.reader_slot().feed.take() {
            self.forward = Some(feed);
        }
        if self.forward.as_ref().is_some_and(|feed| feed.tx.is_closed()) {
            self.forward = None;
        }
    }

    /// Hand buffered bytes to the synchronous reader.
    async fn feed_reader(&mut self) -> Handoff {
        let Some(feed) = self.forward.as_ref() else {
            return Handoff::Detached;
        };
        if self.session.status() != SessionStatus::Enabled || feed.remaining == Some(0) {
            self.forward = None;
            return Handoff::Detached;
        }
        if self.buffer.is_empty() {
            if self.session.is_eof() {
                self.forward = None;
                return Handoff::Detached;
            }
            return Handoff::NeedData;
        }

        let delivered = {
            let Some(feed) = self.forward.as_mut() else {
                return Handoff::Detached;
            };
            // A slot is reserved before any byte leaves the read buffer so
            // nothing is lost if the reader closes meanwhile.
            let permit = tokio::select! {
                biased;
                () = self.session.inner.shutdown.cancelled() => None,
                permit = feed.tx.reserve() => permit.ok(),
            };
            match permit {
                Some(permit) => {
                    let n = feed
                        .remaining
                        .map_or(self.buffer.len(), |left| left.min(self.buffer.len()));
                    permit.send(Bytes::copy_from_slice(&self.buffer[..n]));
                    self.buffer.advance(n);
                    if let Some(left) = feed.remaining.as_mut() {
                        *left -= n;
                    }
                    true
                }
                None => false,
            }
        };
        if delivered {
            Handoff::Delivered
        } else {
            self.forward = None;
            Handoff::Detached
        }
    }
}
