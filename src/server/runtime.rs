//! Runtime control for [`SessionServer`].

mod accept;
mod backoff;

use std::sync::Arc;

use accept::accept_loop;
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{ServerError, SessionServer, connection::SessionContext};
use crate::{handler::Handler, protocol::Protocol};

impl<P, H> SessionServer<P, H>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    /// Run the server until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotBound`] if the server was not bound. Accept
    /// failures are retried with exponential back-off and do not surface as
    /// errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// On shutdown the server stops accepting, asks every live session to
    /// close gracefully and waits for all session tasks to finish. Sessions
    /// still draining writes when the
    /// [`shutdown_timeout`](SessionServer::shutdown_timeout) elapses are
    /// closed immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use tokio::sync::oneshot;
    /// use wiresession::{BoxError, Handler, LengthPrefixedProtocol, Session, SessionServer};
    ///
    /// struct Sink;
    ///
    /// impl Handler for Sink {
    ///     type Message = Bytes;
    ///
    ///     fn process(&self, _: &Session, _: Bytes) -> Result<(), BoxError> { Ok(()) }
    /// }
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wiresession::ServerError> {
    /// let server = SessionServer::new(LengthPrefixedProtocol::default(), Sink)
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotBound`] if the server was not bound.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let SessionServer {
            protocol,
            handler,
            config,
            backoff,
            shutdown_timeout,
            ready_tx,
            listener,
            registry,
        } = self;
        let listener = listener.ok_or(ServerError::NotBound)?;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let ctx = SessionContext {
            protocol,
            handler,
            config: config.with_shared_pool(),
            registry: Arc::clone(&registry),
            tracker: tracker.clone(),
        };
        let local_addr = listener.local_addr().ok();
        let mut acceptor = tokio::spawn(accept_loop(
            listener,
            ctx,
            shutdown_token.clone(),
            backoff,
        ));

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("failed to send readiness signal: receiver dropped");
        }
        info!("server listening: local_addr={local_addr:?}");

        select! {
            () = shutdown => shutdown_token.cancel(),
            res = &mut acceptor => {
                if let Err(e) = res {
                    warn!("accept loop ended abnormally: error={e}");
                }
            }
        }
        if !acceptor.is_finished() {
            let _ = acceptor.await;
        }

        let closing = registry.close_all(false);
        info!("server shutting down: closing_sessions={closing}");
        tracker.close();
        select! {
            () = tracker.wait() => {}
            () = sleep(shutdown_timeout) => {
                let forced = registry.close_all(true);
                warn!(
                    "shutdown grace period elapsed: forced_sessions={forced}, \
                     timeout={shutdown_timeout:?}"
                );
                tracker.wait().await;
            }
        }
        Ok(())
    }
}
