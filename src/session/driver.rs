//! Session construction and the task that drives a connection.

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
};
use tracing::{debug, info};

use super::{
    Session,
    counter::{self, ActiveSession},
    read::ReadPipeline,
    write::WritePipeline,
};
use crate::{
    config::SessionConfig,
    error::SessionError,
    handler::{EventSink, Handler, StateEvent},
    protocol::Protocol,
};

/// Builder for a session over one stream.
///
/// # Examples
///
/// ```no_run
/// use bytes::Bytes;
/// use wiresession::{BoxError, Handler, LengthPrefixedProtocol, Session, SessionConfig};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     type Message = Bytes;
///
///     fn process(&self, session: &Session, message: Bytes) -> Result<(), BoxError> {
///         session.write(&message)?;
///         Ok(())
///     }
/// }
///
/// # async fn demo(stream: tokio::net::TcpStream) -> Result<(), wiresession::SessionError> {
/// Session::builder(LengthPrefixedProtocol::new(1024), Echo)
///     .config(SessionConfig::default().buffer_size(2048))
///     .build(stream)
///     .run()
///     .await
/// # }
/// ```
pub struct SessionBuilder<P, H> {
    protocol: Arc<P>,
    handler: Arc<H>,
    config: SessionConfig,
    peer_addr: Option<SocketAddr>,
}

impl<P, H> SessionBuilder<P, H>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    /// Start from a protocol and handler shared with other sessions.
    #[must_use]
    pub fn shared(protocol: Arc<P>, handler: Arc<H>) -> Self {
        Self {
            protocol,
            handler,
            config: SessionConfig::default(),
            peer_addr: None,
        }
    }

    /// Replace the session configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Record the remote peer's address.
    #[must_use]
    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Bind the session to `stream`.
    ///
    /// Nothing is read or written until the returned driver runs.
    pub fn build<S>(self, stream: S) -> SessionDriver<P, H, S>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let events: Arc<dyn EventSink> = self.handler.clone();
        let session = Session::new(&self.config, events, self.peer_addr);
        SessionDriver {
            session,
            protocol: self.protocol,
            handler: self.handler,
            stream,
        }
    }
}

/// Owns a connection's stream and runs its read and write pipelines.
pub struct SessionDriver<P, H, S> {
    session: Session,
    protocol: Arc<P>,
    handler: Arc<H>,
    stream: S,
}

impl<P, H, S> SessionDriver<P, H, S>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Handle onto the session this driver runs.
    #[must_use]
    pub fn session(&self) -> &Session { &self.session }

    /// Drive the connection until it closes.
    ///
    /// Reports [`StateEvent::NewSession`] before the first read and
    /// [`StateEvent::Closed`] after every buffer has been returned to the
    /// pool and the stream has been shut down.
    ///
    /// # Errors
    ///
    /// Returns the fatal read-path error that tore the connection down: a
    /// decode failure or an exhausted read buffer. Transport failures are
    /// reported to the handler and resolve to `Ok(())`.
    pub async fn run(self) -> Result<(), SessionError> {
        let Self {
            session,
            protocol,
            handler,
            stream,
        } = self;
        let _active = ActiveSession::new();
        info!(
            id = %session.id(),
            peer = ?session.peer_addr(),
            active = counter::active_session_count(),
            "session opened"
        );
        session.emit(StateEvent::NewSession, None);

        let capacity = session.inner.buffer_size;
        let (reader, writer) = tokio::io::split(stream);
        let mut read = ReadPipeline::new(
            session.clone(),
            protocol,
            handler,
            reader,
            session.acquire_buffer(),
            capacity,
        );
        let mut write = WritePipeline::new(session.clone(), writer);
        let (result, ()) = tokio::join!(read.run(), write.run());

        session.close_now();
        let (reader, buffer) = read.into_parts();
        session.release(buffer);
        let (writer, in_flight) = write.into_parts();
        if let Some(buffer) = in_flight {
            session.release(buffer);
        }
        for buffer in session.inner.outbound.close() {
            session.release(buffer);
        }
        let mut stream = reader.unsplit(writer);
        if let Err(e) = stream.shutdown().await {
            debug!(id = %session.id(), error = %e, "stream shutdown failed");
        }
        drop(stream);

        session.emit(StateEvent::Closed, None);
        info!(id = %session.id(), peer = ?session.peer_addr(), "session closed");
        result
    }

    /// Run the driver on a new tokio task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(self) -> (Session, JoinHandle<Result<(), SessionError>>) {
        let session = self.session.clone();
        (session, tokio::spawn(self.run()))
    }
}
