//! Session configuration.
//!
//! [`SessionConfig`] carries the knobs shared by every session created from
//! it: read buffer size, outbound queue bound, buffer pool and monitor.

use std::{fmt, sync::Arc};

use tracing::warn;

use crate::{
    buffer::{BufferPool, FixedBufferPool},
    monitor::Monitor,
};

/// Default read buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Smallest accepted read buffer size.
pub const MIN_BUFFER_SIZE: usize = 64;
/// Largest accepted read buffer size (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;
/// Default bound on queued outbound buffers.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 512;

/// Settings applied to sessions at construction.
///
/// # Examples
///
/// ```
/// use wiresession::SessionConfig;
///
/// let config = SessionConfig::default().buffer_size(8192).outbound_capacity(64);
/// # drop(config);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    pub(crate) buffer_size: usize,
    pub(crate) outbound_capacity: usize,
    pub(crate) pool: Option<Arc<dyn BufferPool>>,
    pub(crate) monitor: Option<Arc<dyn Monitor>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            pool: None,
            monitor: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("buffer_size", &self.buffer_size)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("pool", &self.pool.is_some())
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

impl SessionConfig {
    /// Set the read buffer size in bytes.
    ///
    /// Values outside [`MIN_BUFFER_SIZE`]`..=`[`MAX_BUFFER_SIZE`] are clamped
    /// and a warning is logged. A protocol must be able to frame a message
    /// within this many bytes.
    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        let clamped = bytes.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        if clamped != bytes {
            warn!(
                requested = bytes,
                applied = clamped,
                "read buffer size out of range"
            );
        }
        self.buffer_size = clamped;
        self
    }

    /// Set how many buffers may wait in a session's outbound queue.
    ///
    /// Zero is raised to one.
    #[must_use]
    pub fn outbound_capacity(mut self, buffers: usize) -> Self {
        self.outbound_capacity = buffers.max(1);
        self
    }

    /// Use `pool` for every buffer the session acquires.
    #[must_use]
    pub fn pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Install an I/O monitor.
    #[must_use]
    pub fn monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Configured read buffer size.
    #[must_use]
    pub fn read_buffer_size(&self) -> usize { self.buffer_size }

    /// Configured outbound queue bound.
    #[must_use]
    pub fn outbound_queue_capacity(&self) -> usize { self.outbound_capacity }

    /// Return the configured pool, or a fresh [`FixedBufferPool`] sized to
    /// the read buffer.
    #[must_use]
    pub fn buffer_pool(&self) -> Arc<dyn BufferPool> {
        self.pool
            .clone()
            .unwrap_or_else(|| Arc::new(FixedBufferPool::new(self.buffer_size)))
    }

    /// Fix the pool so that clones of this configuration share it.
    #[must_use]
    pub fn with_shared_pool(self) -> Self {
        let pool = self.buffer_pool();
        self.pool(pool)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::*;

    #[rstest]
    #[case(0, MIN_BUFFER_SIZE)]
    #[case(1024, 1024)]
    #[case(usize::MAX, MAX_BUFFER_SIZE)]
    fn buffer_size_is_clamped(#[case] requested: usize, #[case] applied: usize) {
        assert_eq!(
            SessionConfig::default().buffer_size(requested).read_buffer_size(),
            applied
        );
    }

    #[test]
    #[traced_test]
    fn clamping_logs_warning() {
        let _ = SessionConfig::default().buffer_size(1);
        assert!(logs_contain("read buffer size out of range"));
    }

    #[test]
    fn zero_outbound_capacity_becomes_one() {
        assert_eq!(
            SessionConfig::default()
                .outbound_capacity(0)
                .outbound_queue_capacity(),
            1
        );
    }

    #[test]
    fn shared_pool_is_reused_by_clones() {
        let config = SessionConfig::default().with_shared_pool();
        let copy = config.clone();
        assert!(Arc::ptr_eq(&config.buffer_pool(), &copy.buffer_pool()));
    }
}
