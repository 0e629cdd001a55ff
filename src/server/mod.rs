//! Tokio-based TCP server that runs one session per accepted connection.
//!
//! `SessionServer` accepts connections on a single listener and drives each
//! one with a [`SessionDriver`](crate::SessionDriver) on a tracked task. Live
//! sessions are recorded in a [`SessionRegistry`] so shutdown can close them
//! gracefully before waiting for their tasks.

mod connection;
mod error;
mod runtime;

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

pub use error::ServerError;
pub use runtime::BackoffConfig;
use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    config::SessionConfig,
    handler::Handler,
    protocol::Protocol,
    registry::SessionRegistry,
};

/// Server accepting TCP connections and running a session for each.
///
/// # Examples
///
/// ```no_run
/// use bytes::Bytes;
/// use wiresession::{BoxError, Handler, LengthPrefixedProtocol, Session, SessionServer};
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
/// # #[tokio::main]
/// # async fn main() -> Result<(), wiresession::ServerError> {
/// SessionServer::new(LengthPrefixedProtocol::default(), Echo)
///     .bind(([127, 0, 0, 1], 7878).into())?
///     .run()
///     .await
/// # }
/// ```
pub struct SessionServer<P, H> {
    protocol: Arc<P>,
    handler: Arc<H>,
    config: SessionConfig,
    backoff: BackoffConfig,
    shutdown_timeout: Duration,
    ready_tx: Option<oneshot::Sender<()>>,
    listener: Option<Arc<TcpListener>>,
    registry: Arc<SessionRegistry>,
}

impl<P, H> SessionServer<P, H>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    /// Grace period sessions get to drain their writes on shutdown.
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create an unbound server decoding with `protocol` and dispatching to
    /// `handler`.
    #[must_use]
    pub fn new(protocol: P, handler: H) -> Self {
        Self {
            protocol: Arc::new(protocol),
            handler: Arc::new(handler),
            config: SessionConfig::default(),
            backoff: BackoffConfig::default(),
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
            ready_tx: None,
            listener: None,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Configuration applied to every accepted session.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Back-off applied when `accept()` fails.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// How long shutdown waits for graceful closes before closing the
    /// remaining sessions immediately.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Signal `tx` once the server is accepting connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the socket cannot be bound.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn bind(self, addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_listener(listener)
    }

    /// Take over an already bound standard listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be registered
    /// with the runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn bind_listener(mut self, listener: StdTcpListener) -> Result<Self, ServerError> {
        listener.set_nonblocking(true).map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(listener).map_err(ServerError::Bind)?;
        self.listener = Some(Arc::new(listener));
        Ok(self)
    }

    /// Address the server is bound to, if any.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Registry of the sessions this server is running.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> { Arc::clone(&self.registry) }
}
