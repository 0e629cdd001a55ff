//! Errors raised by [`SessionServer`](super::SessionServer) operations.

use std::io;

use thiserror::Error;

/// Errors that may occur while setting up or running the server.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServerError {
    /// The server was run before being bound to a listener.
    #[error("server is not bound to a listener")]
    NotBound,
    /// Binding or registering the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
}
