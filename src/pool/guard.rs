//! RAII guard for pooled buffers
//!
//! Provides automatic return of transfer buffers to the pool when dropped.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::buffer::PoolInner;

/// A transfer buffer on loan from a [`BufferPool`](super::BufferPool)
///
/// Dropping the guard (or calling [`release`](PooledBuffer::release)) puts
/// the buffer back on the free list. [`abandon`](PooledBuffer::abandon)
/// discards it instead. The guard is not `Clone`, so one buffer can only
/// ever back a single in-flight operation.
pub struct PooledBuffer {
    /// Backing storage; empty once the buffer has been given up
    buf: Vec<u8>,
    /// Usable length requested at acquire time
    limit: usize,
    /// Bytes produced by the last read
    filled: usize,
    /// Pool the buffer goes back to
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub(super) fn new(buf: Vec<u8>, limit: usize, pool: Arc<PoolInner>) -> Self {
        PooledBuffer {
            buf,
            limit,
            filled: 0,
            pool,
        }
    }

    /// Total allocated size of the underlying buffer
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Usable size requested at acquire time
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Region a read should fill
    pub fn read_region(&mut self) -> &mut [u8] {
        self.filled = 0;
        &mut self.buf[..self.limit]
    }

    /// Mark how many bytes the last read produced
    pub fn set_filled(&mut self, n: usize) {
        self.filled = n.min(self.limit);
    }

    /// Bytes produced by the last read
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Return the buffer to its pool
    pub fn release(self) {
        // Drop does the work
    }

    /// Discard the buffer without returning it to the pool
    pub fn abandon(mut self) {
        let buf = std::mem::take(&mut self.buf);
        if !buf.is_empty() {
            self.pool.stats.record_abandoned();
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.filled()
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.buf.len())
            .field("limit", &self.limit)
            .field("filled", &self.filled)
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        if !buf.is_empty() {
            self.pool.put(buf);
            self.pool.stats.record_released();
        }
    }
}
