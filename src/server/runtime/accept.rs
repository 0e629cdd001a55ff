//! Accept loop for the server runtime.

use std::{sync::Arc, time::Duration};

use log::warn;
use tokio::{net::TcpListener, select, time::sleep};
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffConfig;
use crate::{
    handler::Handler,
    protocol::Protocol,
    server::connection::{SessionContext, spawn_session_task},
};

/// Accept connections until `shutdown` is cancelled.
///
/// Each accepted stream becomes a session spawned on the context's tracker.
/// Accept failures are retried after an exponentially growing delay.
pub(in crate::server) async fn accept_loop<P, H>(
    listener: Arc<TcpListener>,
    ctx: SessionContext<P, H>,
    shutdown: CancellationToken,
    backoff: BackoffConfig,
) where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(next) = accept_iteration(&listener, &ctx, &shutdown, &backoff, delay).await {
        delay = next;
    }
}

async fn accept_iteration<P, H>(
    listener: &TcpListener,
    ctx: &SessionContext<P, H>,
    shutdown: &CancellationToken,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    select! {
        biased;

        () = shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, _)) => {
                spawn_session_task(stream, ctx);
                backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                select! {
                    () = shutdown.cancelled() => return None,
                    () = sleep(delay) => {}
                }
                backoff.next_delay(delay)
            }
        }),
    }
}
