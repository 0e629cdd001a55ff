//! Client-side session bootstrap.
//!
//! [`connect`] dials a TCP peer and runs a session for the connection, so the
//! same [`Protocol`] and [`Handler`] pair serves both ends.

use std::{io, net::SocketAddr};

use log::debug;
use tokio::{net::TcpStream, task::JoinHandle};

use crate::{
    config::SessionConfig,
    error::SessionError,
    handler::Handler,
    protocol::Protocol,
    session::Session,
};

/// Connect to `addr` and spawn a session driving the connection.
///
/// Returns the session handle and the driver task, whose result carries any
/// fatal read-path error.
///
/// # Errors
///
/// Returns an [`io::Error`] if the connection cannot be established.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub async fn connect<P, H>(
    addr: SocketAddr,
    protocol: P,
    handler: H,
    config: SessionConfig,
) -> io::Result<(Session, JoinHandle<Result<(), SessionError>>)>
where
    P: Protocol,
    H: Handler<Message = P::Message>,
{
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    debug!("client connected: peer_addr={peer}");
    Ok(Session::builder(protocol, handler)
        .config(config)
        .peer_addr(peer)
        .build(stream)
        .spawn())
}
