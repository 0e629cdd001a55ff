//! Write pipeline: drain the outbound queue one buffer at a time.

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Session, SessionStatus};
use crate::{error::SessionError, handler::StateEvent};

enum Flow {
    Continue,
    Stop,
}

pub(super) struct WritePipeline<W> {
    session: Session,
    writer: W,
    in_flight: Option<BytesMut>,
}

impl<W: AsyncWrite + Unpin> WritePipeline<W> {
    pub(super) fn new(session: Session, writer: W) -> Self {
        Self {
            session,
            writer,
            in_flight: None,
        }
    }

    /// Return the writer and any buffer left in flight by cancellation.
    pub(super) fn into_parts(self) -> (W, Option<BytesMut>) { (self.writer, self.in_flight) }

    /// Drain whenever a flush is scheduled, until the session closes.
    pub(super) async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;
                () = self.session.inner.shutdown.cancelled() => return,
                () = self.session.inner.outbound.ready() => {}
            }
            match self.drain().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return,
                Err(source) => {
                    self.session
                        .report(StateEvent::WriteError, &SessionError::Write(source));
                    self.session.close_now();
                    return;
                }
            }
        }
    }

    async fn drain(&mut self) -> io::Result<Flow> {
        loop {
            // The lease goes up before the pop so a graceful close never sees
            // an empty queue while a popped buffer is still unwritten.
            self.session.set_write_in_flight(true);
            let Some(buffer) = self.session.inner.outbound.pop() else {
                return self.finish_cycle().await;
            };
            if let Flow::Stop = self.continue_write(buffer).await? {
                return Ok(Flow::Stop);
            }
        }
    }

    async fn finish_cycle(&mut self) -> io::Result<Flow> {
        let flushed = tokio::select! {
            biased;
            () = self.session.inner.shutdown.cancelled() => return Ok(Flow::Stop),
            res = self.writer.flush() => res,
        };
        self.session.set_write_in_flight(false);
        self.session.inner.outbound.finish();
        flushed?;
        if self.session.status() == SessionStatus::Enabled {
            // A producer may have enqueued between the empty pop and finish.
            self.session.flush();
        } else {
            self.session.close_now();
        }
        Ok(Flow::Continue)
    }

    /// Write `buffer` until it is fully drained.
    async fn continue_write(&mut self, buffer: BytesMut) -> io::Result<Flow> {
        self.in_flight = Some(buffer);
        while let Some(buffer) = self.in_flight.as_ref() {
            if let Some(monitor) = self.session.monitor() {
                monitor.before_write(&self.session, buffer.len());
            }
            let outcome = tokio::select! {
                biased;
                () = self.session.inner.shutdown.cancelled() => None,
                res = self.writer.write(buffer) => Some(res),
            };
            match outcome {
                Some(Ok(written)) => self.on_write_completed(written)?,
                Some(Err(e)) => {
                    self.after_write(0);
                    return Err(e);
                }
                None => {
                    self.after_write(0);
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn after_write(&self, written: usize) {
        if let Some(monitor) = self.session.monitor() {
            monitor.after_write(&self.session, written);
        }
    }

    fn on_write_completed(&mut self, written: usize) -> io::Result<()> {
        self.after_write(written);
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        let drained = self.in_flight.as_mut().is_some_and(|buffer| {
            buffer.advance(written);
            buffer.is_empty()
        });
        if drained && let Some(buffer) = self.in_flight.take() {
            self.session.release(buffer);
        }
        Ok(())
    }
}
