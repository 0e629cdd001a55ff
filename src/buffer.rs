//! Buffer pool contract and the default fixed-size pool.
//!
//! Sessions never allocate I/O buffers directly. They acquire them from a
//! [`BufferPool`], become the exclusive owner, and hand each buffer back
//! exactly once through [`BufferPool::release`].

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use bytes::BytesMut;

/// Source of reusable byte buffers.
///
/// Callers own an acquired buffer exclusively and must release it exactly
/// once. Implementations are not required to tolerate double releases.
pub trait BufferPool: Send + Sync + 'static {
    /// Hand out an empty buffer.
    fn acquire(&self) -> BytesMut;

    /// Return a buffer previously obtained from [`acquire`](Self::acquire).
    fn release(&self, buffer: BytesMut);
}

/// Pool of equally sized buffers backed by a free list.
///
/// Released buffers are cleared and kept for reuse up to `max_idle`; any
/// surplus is dropped.
#[derive(Debug)]
pub struct FixedBufferPool {
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<BytesMut>>,
    outstanding: AtomicUsize,
}

impl FixedBufferPool {
    /// Default number of idle buffers retained for reuse.
    pub const DEFAULT_MAX_IDLE: usize = 256;

    /// Create a pool of buffers holding `buffer_size` bytes each.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self { Self::with_max_idle(buffer_size, Self::DEFAULT_MAX_IDLE) }

    /// Create a pool that keeps at most `max_idle` released buffers.
    #[must_use]
    pub fn with_max_idle(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            buffer_size,
            max_idle,
            idle: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Capacity of every buffer handed out by this pool.
    #[must_use]
    pub fn buffer_size(&self) -> usize { self.buffer_size }

    /// Number of buffers acquired and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize { self.outstanding.load(Ordering::Acquire) }

    /// Number of released buffers waiting for reuse.
    #[must_use]
    pub fn idle(&self) -> usize { self.idle.lock().map_or(0, |idle| idle.len()) }
}

impl BufferPool for FixedBufferPool {
    fn acquire(&self) -> BytesMut {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        reused.unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size))
    }

    fn release(&self, mut buffer: BytesMut) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        buffer.clear();
        // Advancing a buffer shrinks its visible capacity; reclaim it so the
        // next owner sees a full-size buffer.
        if buffer.capacity() < self.buffer_size {
            buffer.reserve(self.buffer_size);
        }
        if let Ok(mut idle) = self.idle.lock()
            && idle.len() < self.max_idle
        {
            idle.push(buffer);
        }
    }
}
