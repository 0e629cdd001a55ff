//! Per-connection session engine.
//!
//! A [`Session`] is a cheap, cloneable handle onto one connection. The
//! connection itself is driven by a [`SessionDriver`], which owns the stream
//! and runs two pipelines inside a single task:
//!
//! - the read pipeline fills the read buffer, decodes as many whole messages as
//!   it holds and dispatches each one to the [`Handler`];
//! - the write pipeline drains the [`OutboundQueue`] with at most one write in
//!   flight.
//!
//! Producers on any thread enqueue buffers through the handle. Closing is a
//! monotonic state machine (`Enabled` → `Closing` → `Closed`); see
//! [`Session::close`].

mod counter;
mod driver;
mod read;
mod state;
mod write;

use std::{
    any::Any,
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
pub use counter::active_session_count;
pub use driver::{SessionBuilder, SessionDriver};
pub use state::SessionStatus;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    buffer::BufferPool,
    config::SessionConfig,
    error::{EnqueueError, SessionError},
    handler::{EventSink, Handler, StateEvent},
    metrics,
    monitor::Monitor,
    outbound::OutboundQueue,
    protocol::Protocol,
    sync_reader::SyncReader,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a [`SessionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }

    fn next() -> Self { Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)) }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// Handoff from the read pipeline to an open [`SyncReader`].
pub(crate) struct ReaderFeed {
    pub(crate) tx: mpsc::Sender<Bytes>,
    pub(crate) remaining: Option<usize>,
}

/// Lease for the single synchronous reader a session may have.
#[derive(Default)]
pub(crate) struct ReaderSlot {
    pub(crate) open: bool,
    pub(crate) feed: Option<ReaderFeed>,
}

type Attachment = Arc<dyn Any + Send + Sync>;

pub(crate) struct SessionInner {
    id: SessionId,
    peer_addr: Option<SocketAddr>,
    status: AtomicU8,
    eof: AtomicBool,
    generation: AtomicU64,
    buffer_size: usize,
    pub(crate) outbound: OutboundQueue,
    write_in_flight: AtomicBool,
    shutdown: CancellationToken,
    read_wake: Notify,
    reader: Mutex<ReaderSlot>,
    attachment: Mutex<Option<Attachment>>,
    pool: Arc<dyn BufferPool>,
    events: Arc<dyn EventSink>,
    monitor: Option<Arc<dyn Monitor>>,
}

/// Handle onto one connection.
///
/// Clones share the same connection. The handle stays usable after the
/// connection closes; operations then fail with a closed error or do nothing.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Start building a session that decodes with `protocol` and dispatches
    /// to `handler`.
    #[must_use]
    pub fn builder<P, H>(protocol: P, handler: H) -> SessionBuilder<P, H>
    where
        P: Protocol,
        H: Handler<Message = P::Message>,
    {
        SessionBuilder::shared(Arc::new(protocol), Arc::new(handler))
    }

    pub(crate) fn new(
        config: &SessionConfig,
        events: Arc<dyn EventSink>,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        let inner = SessionInner {
            id: SessionId::next(),
            peer_addr,
            status: AtomicU8::new(SessionStatus::Enabled as u8),
            eof: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            buffer_size: config.buffer_size,
            outbound: OutboundQueue::new(config.outbound_capacity),
            write_in_flight: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            read_wake: Notify::new(),
            reader: Mutex::new(ReaderSlot::default()),
            attachment: Mutex::new(None),
            pool: config.buffer_pool(),
            events,
            monitor: config.monitor.clone(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<SessionInner> { Arc::downgrade(&self.inner) }

    pub(crate) fn from_arc(inner: Arc<SessionInner>) -> Self { Self { inner } }

    /// Identifier of this session.
    #[must_use]
    pub fn id(&self) -> SessionId { self.inner.id }

    /// Address of the remote peer, when known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.inner.peer_addr }

    /// Returns `true` once the peer has signalled end-of-stream.
    #[must_use]
    pub fn is_eof(&self) -> bool { self.inner.eof.load(Ordering::Acquire) }

    /// Returns `true` if a write is in flight or queued writes are being
    /// drained.
    #[must_use]
    pub fn is_writing(&self) -> bool { self.inner.write_in_flight.load(Ordering::SeqCst) }

    /// Number of buffers waiting in the outbound queue.
    #[must_use]
    pub fn pending_writes(&self) -> usize { self.inner.outbound.len() }

    /// Append `buffer` to the outbound queue.
    ///
    /// The buffer is not written until [`flush`](Self::flush) is called or
    /// the current batch of inbound messages has been dispatched.
    ///
    /// `buffer` must come from [`acquire_buffer`](Self::acquire_buffer): the
    /// session returns it to the pool once written or rejected.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] if the queue is at capacity and
    /// [`EnqueueError::Closed`] once the session is closed.
    pub fn enqueue_write(&self, buffer: BytesMut) -> Result<(), EnqueueError> {
        self.inner.outbound.try_push(buffer).map_err(|(err, buffer)| {
            self.release(buffer);
            err
        })
    }

    /// Append `buffer`, waiting for queue capacity, then flush.
    ///
    /// `buffer` must come from [`acquire_buffer`](Self::acquire_buffer).
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Closed`] if the session closes first. The
    /// buffer is returned to the pool.
    pub async fn send(&self, buffer: BytesMut) -> Result<(), EnqueueError> {
        if let Err((err, buffer)) = self.inner.outbound.push(buffer).await {
            self.release(buffer);
            return Err(err);
        }
        self.flush();
        Ok(())
    }

    /// Copy `data` into pool buffers and enqueue them in order.
    ///
    /// Data larger than one buffer is split across several, which are
    /// enqueued together or not at all, so a framed message is never left
    /// half queued. Nothing is flushed.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] if the queue cannot take every chunk
    /// and [`EnqueueError::Closed`] once the session is closed. The chunks
    /// are returned to the pool.
    pub fn write(&self, data: &[u8]) -> Result<(), EnqueueError> {
        let mut chunks = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let mut buffer = self.acquire_buffer();
            let n = match buffer.capacity() {
                0 => rest.len(),
                capacity => capacity.min(rest.len()),
            };
            let (chunk, tail) = rest.split_at(n);
            buffer.extend_from_slice(chunk);
            chunks.push(buffer);
            rest = tail;
        }
        self.inner.outbound.try_push_all(chunks).map_err(|(err, chunks)| {
            for buffer in chunks {
                self.release(buffer);
            }
            err
        })
    }

    /// Schedule a drain of the outbound queue.
    ///
    /// Idempotent; does nothing when the queue is empty or a drain is
    /// already running.
    pub fn flush(&self) { self.inner.outbound.flush(); }

    /// Obtain an empty buffer from the session's pool.
    ///
    /// Pass it to [`enqueue_write`](Self::enqueue_write) or
    /// [`send`](Self::send), which take over the obligation to release it.
    /// Those are the only buffers they accept; a buffer allocated elsewhere
    /// would unbalance the pool when released.
    #[must_use]
    pub fn acquire_buffer(&self) -> BytesMut { self.inner.pool.acquire() }

    pub(crate) fn release(&self, buffer: BytesMut) { self.inner.pool.release(buffer); }

    /// Return the attachment if one is set and has type `T`.
    #[must_use]
    pub fn attachment<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let current = lock(&self.inner.attachment).clone()?;
        current.downcast::<T>().ok()
    }

    /// Replace the attachment with `value`.
    ///
    /// Invalidates any decode iteration in progress.
    pub fn set_attachment<T: Any + Send + Sync>(&self, value: T) {
        *lock(&self.inner.attachment) = Some(Arc::new(value));
        self.bump_generation();
    }

    /// Remove the attachment.
    pub fn clear_attachment(&self) {
        *lock(&self.inner.attachment) = None;
        self.bump_generation();
    }

    /// Open a blocking reader over this session's inbound bytes.
    ///
    /// While the reader is open, inbound bytes are handed to it instead of
    /// being decoded. With `length` set, the reader reports end-of-stream
    /// after that many bytes; otherwise it runs until the peer closes its
    /// side.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ReaderAlreadyOpen`] if another reader has not
    /// been closed yet and [`SessionError::Closed`] if the session is closed.
    /// Neither changes session state.
    pub fn open_sync_reader(&self, length: Option<usize>) -> Result<SyncReader, SessionError> {
        if self.status() == SessionStatus::Closed {
            return Err(SessionError::Closed);
        }
        let (tx, rx) = mpsc::channel(1);
        {
            let mut slot = self.reader_slot();
            if slot.open {
                debug!(id = %self.id(), "rejected second synchronous reader");
                return Err(SessionError::ReaderAlreadyOpen);
            }
            slot.open = true;
            slot.feed = Some(ReaderFeed {
                tx,
                remaining: length,
            });
        }
        self.bump_generation();
        self.inner.read_wake.notify_one();
        Ok(SyncReader::new(self.clone(), rx, length))
    }

    /// Give up the reader lease and hand inbound bytes back to the decoder.
    pub(crate) fn release_reader(&self) {
        {
            let mut slot = self.reader_slot();
            slot.open = false;
            slot.feed = None;
        }
        self.bump_generation();
        self.inner.read_wake.notify_one();
    }

    pub(crate) fn reader_slot(&self) -> MutexGuard<'_, ReaderSlot> { lock(&self.inner.reader) }

    pub(crate) fn generation(&self) -> u64 { self.inner.generation.load(Ordering::Acquire) }

    fn bump_generation(&self) { self.inner.generation.fetch_add(1, Ordering::AcqRel); }

    pub(crate) fn monitor(&self) -> Option<&dyn Monitor> { self.inner.monitor.as_deref() }

    pub(crate) fn emit(&self, event: StateEvent, cause: Option<&SessionError>) {
        debug!(id = %self.id(), %event, "state event");
        self.inner.events.emit(self, event, cause);
    }

    /// Log, count and report a classified failure.
    pub(crate) fn report(&self, event: StateEvent, error: &SessionError) {
        warn!(id = %self.id(), peer = ?self.peer_addr(), %event, %error, "session error");
        metrics::inc_errors(error.kind());
        self.emit(event, Some(error));
    }
}

/// Detached session for exercising protocols without a connection.
#[cfg(test)]
pub(crate) fn test_session() -> Session {
    use crate::{buffer::FixedBufferPool, handler::NoopEvents};

    let config = SessionConfig::default()
        .buffer_size(64)
        .outbound_capacity(8)
        .pool(Arc::new(FixedBufferPool::new(64)));
    Session::new(&config, Arc::new(NoopEvents), None)
}
