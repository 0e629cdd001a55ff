//! Business dispatch and lifecycle notifications.
//!
//! A [`Handler`] receives every decoded message through
//! [`Handler::process`] and every lifecycle transition or classified failure
//! through [`Handler::state_event`].

use std::fmt;

use crate::{
    error::{BoxError, SessionError},
    session::Session,
};

/// Lifecycle transitions and failures reported to a [`Handler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateEvent {
    /// The session was created; fired before the first read is issued.
    NewSession,
    /// A graceful close was requested while writes were still pending.
    Closing,
    /// The session is closed and all of its resources have been released.
    Closed,
    /// Input ended, either because the peer sent end-of-stream or because the session is
    /// closing.
    InputShutdown,
    /// Inbound bytes could not be framed. The connection is torn down.
    DecodeError,
    /// The handler failed to process one message. Decoding continues.
    ProcessError,
    /// Reading from the transport failed. A graceful close follows.
    ReadError,
    /// Writing to the transport failed. An immediate close follows.
    WriteError,
}

impl StateEvent {
    /// Stable lowercase label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewSession => "new_session",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::InputShutdown => "input_shutdown",
            Self::DecodeError => "decode_error",
            Self::ProcessError => "process_error",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
        }
    }
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Application logic attached to every session.
///
/// `process` runs on the session task between decoding steps. It must not
/// block; writes it produces are enqueued and flushed once the current batch
/// of messages has been dispatched.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use wiresession::{BoxError, Handler, Session};
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
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Message type accepted by this handler.
    type Message: Send + 'static;

    /// Dispatch one decoded message.
    ///
    /// # Errors
    ///
    /// A returned error is reported as [`StateEvent::ProcessError`]; the
    /// session keeps running.
    fn process(&self, session: &Session, message: Self::Message) -> Result<(), BoxError>;

    /// Observe a lifecycle transition or a classified failure.
    fn state_event(&self, _session: &Session, _event: StateEvent, _cause: Option<&SessionError>) {}
}

/// Object-safe view of [`Handler::state_event`] stored on the session.
pub(crate) trait EventSink: Send + Sync + 'static {
    fn emit(&self, session: &Session, event: StateEvent, cause: Option<&SessionError>);
}

impl<H: Handler> EventSink for H {
    fn emit(&self, session: &Session, event: StateEvent, cause: Option<&SessionError>) {
        self.state_event(session, event, cause);
    }
}

/// Handler that accepts nothing and ignores every event.
#[cfg(test)]
pub(crate) struct NoopEvents;

#[cfg(test)]
impl Handler for NoopEvents {
    type Message = ();

    fn process(&self, _session: &Session, (): ()) -> Result<(), BoxError> { Ok(()) }
}
