//! Session task spawning for [`SessionServer`](super::SessionServer).

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::{error, warn};
use tokio::net::TcpStream;
use tokio_util::task::TaskTracker;

use crate::{
    config::SessionConfig,
    handler::Handler,
    metrics,
    panic::format_panic,
    protocol::Protocol,
    registry::SessionRegistry,
    session::SessionBuilder,
};

/// Everything an accepted connection needs to become a session.
pub(super) struct SessionContext<P, H> {
    pub protocol: Arc<P>,
    pub handler: Arc<H>,
    pub config: SessionConfig,
    pub registry: Arc<SessionRegistry>,
    pub tracker: TaskTracker,
}

/// Spawn a tracked task driving `stream`, logging and discarding any panic.
pub(super) fn spawn_session_task<P, H>(stream: TcpStream, ctx: &SessionContext<P, H>)
where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("failed to retrieve peer address: error={e}");
            None
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY: error={e}, peer_addr={peer_addr:?}");
    }

    let mut builder = SessionBuilder::shared(Arc::clone(&ctx.protocol), Arc::clone(&ctx.handler))
        .config(ctx.config.clone());
    if let Some(addr) = peer_addr {
        builder = builder.peer_addr(addr);
    }
    let driver = builder.build(stream);
    let session = driver.session().clone();
    ctx.registry.insert(&session);
    let registry = Arc::clone(&ctx.registry);

    ctx.tracker.spawn(async move {
        let outcome = AssertUnwindSafe(driver.run()).catch_unwind().await;
        registry.remove(&session.id());
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    "session terminated: id={}, error={e}, peer_addr={peer_addr:?}",
                    session.id()
                );
            }
            Err(panic) => {
                session.close(true);
                metrics::inc_errors("panic");
                let panic_msg = format_panic(panic.as_ref());
                error!("session task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
                tracing::error!(panic = %panic_msg, ?peer_addr, "session task panicked");
            }
        }
    });
}
