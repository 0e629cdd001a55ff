//! Shared utilities for integration tests.
//!
//! Provides recording implementations of the session collaborators, a
//! stream wrapper that can throttle or fail writes and counts shutdowns, and
//! helpers to spawn a session over an in-memory duplex pipe.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf},
    task::JoinHandle,
};
use wiresession::{
    BoxError,
    BufferPool,
    FixedBufferPool,
    Handler,
    LengthPrefixedProtocol,
    Monitor,
    Protocol,
    Session,
    SessionConfig,
    SessionError,
    StateEvent,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Capacity of the in-memory pipe between client and session.
pub const PIPE_CAPACITY: usize = 256;

/// One observation made by a recording collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    Event(StateEvent),
    Process(Vec<u8>),
    BeforeRead,
    AfterRead(usize),
    BeforeWrite(usize),
    AfterWrite(usize),
}

/// Shared, ordered log of traces.
#[derive(Clone, Debug, Default)]
pub struct TraceLog(Arc<Mutex<Vec<Trace>>>);

impl TraceLog {
    pub fn push(&self, trace: Trace) { self.lock().push(trace); }

    pub fn snapshot(&self) -> Vec<Trace> { self.lock().clone() }

    pub fn events(&self) -> Vec<StateEvent> {
        self.snapshot()
            .into_iter()
            .filter_map(|t| match t {
                Trace::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn count_event(&self, event: StateEvent) -> usize {
        self.events().into_iter().filter(|e| *e == event).count()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.snapshot()
            .into_iter()
            .filter_map(|t| match t {
                Trace::Process(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Trace>> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Handler recording every message and event, optionally echoing or failing.
#[derive(Clone, Debug, Default)]
pub struct RecordingHandler {
    pub log: TraceLog,
    pub fail_on: Option<Vec<u8>>,
    pub echo: bool,
    pub reattach: bool,
}

impl RecordingHandler {
    pub fn new(log: TraceLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_on(mut self, message: &[u8]) -> Self {
        self.fail_on = Some(message.to_vec());
        self
    }

    #[must_use]
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Replace the session attachment while processing every message.
    #[must_use]
    pub fn reattaching(mut self) -> Self {
        self.reattach = true;
        self
    }
}

impl Handler for RecordingHandler {
    type Message = Bytes;

    fn process(&self, session: &Session, message: Bytes) -> Result<(), BoxError> {
        self.log.push(Trace::Process(message.to_vec()));
        if self.fail_on.as_deref() == Some(&message[..]) {
            return Err("message rejected".into());
        }
        if self.reattach {
            session.set_attachment(message.clone());
        }
        if self.echo {
            session.write(&message)?;
        }
        Ok(())
    }

    fn state_event(&self, _session: &Session, event: StateEvent, _cause: Option<&SessionError>) {
        self.log.push(Trace::Event(event));
    }
}

/// Handler echoing length-prefixed frames back to the sender.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler {
    pub protocol: LengthPrefixedProtocol,
}

impl Handler for EchoHandler {
    type Message = Bytes;

    fn process(&self, session: &Session, message: Bytes) -> Result<(), BoxError> {
        let mut frame = BytesMut::new();
        self.protocol.encode(&message, &mut frame)?;
        session.write(&frame)?;
        Ok(())
    }
}

/// Monitor recording I/O hooks and the peak number of outstanding
/// operations.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    pub log: TraceLog,
    reads: AtomicUsize,
    writes: AtomicUsize,
    max_reads: AtomicUsize,
    max_writes: AtomicUsize,
}

impl RecordingMonitor {
    pub fn new(log: TraceLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn max_outstanding_reads(&self) -> usize { self.max_reads.load(Ordering::SeqCst) }

    pub fn max_outstanding_writes(&self) -> usize { self.max_writes.load(Ordering::SeqCst) }
}

impl Monitor for RecordingMonitor {
    fn before_read(&self, _session: &Session, _capacity: usize) {
        let now = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_reads.fetch_max(now, Ordering::SeqCst);
        self.log.push(Trace::BeforeRead);
    }

    fn after_read(&self, _session: &Session, bytes: usize) {
        self.reads.fetch_sub(1, Ordering::SeqCst);
        self.log.push(Trace::AfterRead(bytes));
    }

    fn before_write(&self, _session: &Session, bytes: usize) {
        let now = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writes.fetch_max(now, Ordering::SeqCst);
        self.log.push(Trace::BeforeWrite(bytes));
    }

    fn after_write(&self, _session: &Session, bytes: usize) {
        self.writes.fetch_sub(1, Ordering::SeqCst);
        self.log.push(Trace::AfterWrite(bytes));
    }
}

/// Pool counting acquisitions and releases.
#[derive(Debug)]
pub struct CountingPool {
    inner: FixedBufferPool,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: FixedBufferPool::new(buffer_size),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn acquired(&self) -> usize { self.acquired.load(Ordering::SeqCst) }

    pub fn released(&self) -> usize { self.released.load(Ordering::SeqCst) }
}

impl BufferPool for CountingPool {
    fn acquire(&self) -> BytesMut {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire()
    }

    fn release(&self, buffer: BytesMut) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(buffer);
    }
}

/// Decoder that never produces a frame and never consumes input.
#[derive(Clone, Copy, Debug, Default)]
pub struct StuckProtocol;

impl Protocol for StuckProtocol {
    type Message = Bytes;

    fn decode(&self, _src: &mut BytesMut, _session: &Session) -> io::Result<Option<Bytes>> {
        Ok(None)
    }

    fn name(&self) -> &'static str { "StuckProtocol" }
}

/// Session-side stream wrapping one end of a duplex pipe.
///
/// Writes can be capped to a few bytes per call to force partial writes.
/// Reads or writes can be made to fail. Shutdown calls are counted.
#[derive(Debug)]
pub struct TestStream {
    inner: DuplexStream,
    write_limit: Option<usize>,
    fail_reads: bool,
    fail_writes: bool,
    shutdowns: Arc<AtomicUsize>,
}

impl TestStream {
    /// Create a connected pair: the session-side stream and the client end.
    pub fn pair() -> (Self, DuplexStream) {
        let (server, client) = tokio::io::duplex(PIPE_CAPACITY);
        let stream = Self {
            inner: server,
            write_limit: None,
            fail_reads: false,
            fail_writes: false,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        };
        (stream, client)
    }

    #[must_use]
    pub fn write_limit(mut self, bytes: usize) -> Self {
        self.write_limit = Some(bytes);
        self
    }

    #[must_use]
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    #[must_use]
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn shutdown_counter(&self) -> Arc<AtomicUsize> { Arc::clone(&self.shutdowns) }
}

impl AsyncRead for TestStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.fail_reads {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read failure",
            )));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.fail_writes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        let n = this.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        Pin::new(&mut this.inner).poll_write(cx, &buf[..n])
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

/// Collaborators and handles for one session under test.
pub struct Harness {
    pub log: TraceLog,
    pub pool: Arc<CountingPool>,
    pub monitor: Arc<RecordingMonitor>,
}

impl Harness {
    pub fn new() -> Self {
        let log = TraceLog::default();
        Self {
            pool: Arc::new(CountingPool::new(64)),
            monitor: Arc::new(RecordingMonitor::new(log.clone())),
            log,
        }
    }

    /// Configuration wiring the counting pool and recording monitor in.
    pub fn config(&self) -> SessionConfig {
        SessionConfig::default()
            .buffer_size(64)
            .pool(self.pool.clone())
            .monitor(self.monitor.clone())
    }

    pub fn handler(&self) -> RecordingHandler { RecordingHandler::new(self.log.clone()) }
}

/// Spawn a session over `stream`.
pub fn spawn<P>(
    protocol: P,
    handler: RecordingHandler,
    config: SessionConfig,
    stream: TestStream,
) -> (Session, JoinHandle<Result<(), SessionError>>)
where
    P: Protocol<Message = Bytes>,
{
    Session::builder(protocol, handler)
        .config(config)
        .build(stream)
        .spawn()
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> TestResult {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| "condition not met within two seconds".into())
}

/// Await a session task, failing after two seconds.
pub async fn join(
    task: JoinHandle<Result<(), SessionError>>,
) -> TestResult<Result<(), SessionError>> {
    Ok(tokio::time::timeout(Duration::from_secs(2), task).await??)
}
