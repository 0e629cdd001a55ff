//! FIFO queue of buffers awaiting transmission.
//!
//! Any thread may enqueue. Only the session's write pipeline drains the queue,
//! one buffer at a time, so buffers reach the wire in enqueue order and a
//! buffer enqueued while another is in flight is appended behind it.
//!
//! Draining is scheduled with [`OutboundQueue::flush`]. A drain cycle ends
//! with [`OutboundQueue::finish`]; until then further flushes are absorbed by
//! the running cycle.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::BytesMut;
use tokio::sync::Notify;

use crate::error::EnqueueError;

/// A buffer rejected by the queue, handed back to the caller.
pub type Rejected = (EnqueueError, BytesMut);

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<BytesMut>,
    closed: bool,
}

/// Bounded, internally synchronised FIFO of outbound buffers.
#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    draining: AtomicBool,
    ready: Notify,
    space: Notify,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` buffers (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
            draining: AtomicBool::new(false),
            ready: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Maximum number of queued buffers.
    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means a producer panicked mid-push; the deque
        // itself is still consistent.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append `buffer` without waiting.
    ///
    /// # Errors
    ///
    /// Returns the buffer together with [`EnqueueError::Full`] when the queue
    /// is at capacity, or [`EnqueueError::Closed`] once it has been closed.
    pub fn try_push(&self, buffer: BytesMut) -> Result<(), Rejected> {
        let mut state = self.lock();
        if state.closed {
            return Err((EnqueueError::Closed, buffer));
        }
        if state.items.len() >= self.capacity {
            return Err((EnqueueError::Full, buffer));
        }
        state.items.push_back(buffer);
        Ok(())
    }

    /// Append every buffer in `buffers`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns all of the buffers with [`EnqueueError::Full`] when the queue
    /// cannot take them together, or [`EnqueueError::Closed`] once it has
    /// been closed.
    pub fn try_push_all(
        &self,
        buffers: Vec<BytesMut>,
    ) -> Result<(), (EnqueueError, Vec<BytesMut>)> {
        let mut state = self.lock();
        if state.closed {
            return Err((EnqueueError::Closed, buffers));
        }
        if state.items.len() + buffers.len() > self.capacity {
            return Err((EnqueueError::Full, buffers));
        }
        state.items.extend(buffers);
        Ok(())
    }

    /// Append `buffer`, waiting for space when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the buffer with [`EnqueueError::Closed`] if the queue closes
    /// before space becomes available.
    pub async fn push(&self, mut buffer: BytesMut) -> Result<(), Rejected> {
        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.try_push(buffer) {
                Err((EnqueueError::Full, returned)) => {
                    buffer = returned;
                    notified.await;
                }
                other => return other,
            }
        }
    }

    /// Remove the oldest buffer.
    pub fn pop(&self) -> Option<BytesMut> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Number of queued buffers.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().items.len() }

    /// Returns `true` if no buffer is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().items.is_empty() }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }

    /// Schedule a drain cycle if buffers are waiting and none is running.
    ///
    /// Idempotent and safe on an empty queue. Returns `true` if this call
    /// started a new cycle.
    pub fn flush(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.draining.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.ready.notify_one();
        true
    }

    /// Mark the current drain cycle as finished.
    pub fn finish(&self) { self.draining.store(false, Ordering::Release); }

    /// Returns `true` while a drain cycle is scheduled or running.
    #[must_use]
    pub fn is_draining(&self) -> bool { self.draining.load(Ordering::Acquire) }

    /// Wake the drainer regardless of queue contents.
    ///
    /// Used when session state changes and the drainer must re-evaluate it.
    pub(crate) fn wake(&self) { self.ready.notify_one(); }

    /// Wait until a drain is scheduled or the drainer is woken.
    pub(crate) async fn ready(&self) { self.ready.notified().await; }

    /// Reject further pushes and hand back every queued buffer.
    pub fn close(&self) -> Vec<BytesMut> {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.space.notify_waiters();
        drained
    }
}
