//! Transfer buffer pool
//!
//! A free list of fixed-size byte buffers shared by every connection of every
//! proxy. The list grows whenever it runs dry and never shrinks.

use crossbeam_queue::SegQueue;
use lazy_static::lazy_static;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::guard::PooledBuffer;
use super::stats::{PoolStats, PoolStatsSnapshot};
use crate::helper::PACKET_SIZE;

lazy_static! {
    static ref GLOBAL_POOL: BufferPool = BufferPool::new(PACKET_SIZE);
}

/// Shared state behind a [`BufferPool`] handle
pub(crate) struct PoolInner {
    /// Free buffers; each is fully initialised to its allocated size
    free: SegQueue<Vec<u8>>,
    /// Default allocation size
    packet_size: usize,
    /// Usage counters
    pub(super) stats: PoolStats,
}

impl PoolInner {
    pub(super) fn put(&self, buf: Vec<u8>) {
        self.free.push(buf);
    }
}

/// Cloneable handle to a buffer pool
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool whose fresh buffers are `packet_size` bytes
    pub fn new(packet_size: usize) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                free: SegQueue::new(),
                packet_size,
                stats: PoolStats::new(),
            }),
        }
    }

    /// The process-wide pool of [`PACKET_SIZE`] buffers
    pub fn global() -> Self {
        GLOBAL_POOL.clone()
    }

    /// Whether both handles point at the same free list
    pub fn same_pool(&self, other: &BufferPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Size of freshly allocated buffers
    pub fn packet_size(&self) -> usize {
        self.inner.packet_size
    }

    /// Allocate `count` buffers straight onto the free list
    pub fn preallocate(&self, count: usize) {
        for _ in 0..count {
            self.inner.put(vec![0u8; self.inner.packet_size]);
        }
        debug!("Preallocated {} buffers of {} bytes", count, self.inner.packet_size);
    }

    /// Preallocate until at least `target` buffers sit on the free list
    pub fn fill_to(&self, target: usize) {
        let missing = target.saturating_sub(self.available());
        if missing > 0 {
            self.preallocate(missing);
        }
    }

    /// Take a buffer of at least `min_size` bytes
    ///
    /// A pooled buffer is preferred. Undersized buffers met along the way go
    /// back on the free list, and a fresh one is allocated if nothing fits.
    pub fn acquire(&self, min_size: usize) -> PooledBuffer {
        let mut undersized = Vec::new();
        let mut found = None;

        for _ in 0..self.inner.free.len() {
            match self.inner.free.pop() {
                Some(buf) if buf.len() >= min_size => {
                    found = Some(buf);
                    break;
                }
                Some(buf) => undersized.push(buf),
                None => break,
            }
        }
        for buf in undersized {
            self.inner.put(buf);
        }

        let buf = match found {
            Some(buf) => {
                self.inner.stats.record_reused();
                buf
            }
            None => {
                self.inner.stats.record_allocated();
                vec![0u8; min_size.max(self.inner.packet_size)]
            }
        };

        PooledBuffer::new(buf, min_size, self.inner.clone())
    }

    /// Take a buffer of exactly one packet
    pub fn acquire_packet(&self) -> PooledBuffer {
        self.acquire(self.inner.packet_size)
    }

    /// Return a buffer to the pool; `None` is a no-op
    pub fn release(&self, buffer: Option<PooledBuffer>) {
        if let Some(buffer) = buffer {
            buffer.release();
        }
    }

    /// Number of buffers on the free list
    pub fn available(&self) -> usize {
        self.inner.free.len()
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.inner.stats.snapshot(self.available())
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("packet_size", &self.inner.packet_size)
            .field("available", &self.available())
            .finish()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_acquire_allocates_when_empty() {
        let pool = BufferPool::new(1024);
        let buf = pool.acquire(1024);
        assert_eq!(buf.capacity(), 1024);

        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 0);
        assert_eq!(stats.in_use, 1);
    }

    #[test]
    fn test_acquire_reuses_released_buffer() {
        let pool = BufferPool::new(1024);
        let buf = pool.acquire(1024);
        let ptr = buf.as_ptr();
        buf.release();

        let buf = pool.acquire(512);
        assert_eq!(buf.as_ptr(), ptr);
        assert_eq!(buf.limit(), 512);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn test_fill_to_tops_up_once() {
        let pool = BufferPool::new(256);
        pool.fill_to(3);
        pool.fill_to(3);
        assert_eq!(pool.available(), 3);

        let held = pool.acquire_packet();
        pool.fill_to(3);
        assert_eq!(pool.available(), 3);
        held.release();
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.stats().allocations, 0);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn test_acquire_larger_than_packet() {
        let pool = BufferPool::new(1024);
        pool.acquire(1024).release();

        let big = pool.acquire(4096);
        assert!(big.capacity() >= 4096);
        // The small buffer stays available
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.stats().allocations, 2);
    }

    #[test]
    fn test_release_none_is_noop() {
        let pool = BufferPool::new(128);
        pool.release(None);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.stats().releases, 0);

        let buf = pool.acquire_packet();
        pool.release(Some(buf));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_preallocate() {
        let pool = BufferPool::new(256);
        pool.preallocate(8);
        assert_eq!(pool.available(), 8);

        let _buf = pool.acquire_packet();
        assert_eq!(pool.available(), 7);
        assert_eq!(pool.stats().allocations, 0);
    }

    #[test]
    fn test_outstanding_buffers_are_distinct() {
        let pool = BufferPool::new(64);
        pool.preallocate(4);

        let held: Vec<_> = (0..8).map(|_| pool.acquire_packet()).collect();
        let ptrs: HashSet<_> = held.iter().map(|b| b.as_ptr() as usize).collect();
        assert_eq!(ptrs.len(), 8);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = BufferPool::new(64);
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut buf = pool.acquire_packet();
                        buf.read_region().fill(i as u8);
                        buf.set_filled(64);
                        assert!(buf.filled().iter().all(|b| *b == i as u8));
                        buf.release();
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.allocations + stats.reuses, 8000);
        assert_eq!(stats.available, stats.allocations);
    }

    #[test]
    fn test_global_pool_is_shared() {
        let a = BufferPool::global();
        let b = BufferPool::global();
        assert_eq!(a.packet_size(), PACKET_SIZE);
        assert!(a.same_pool(&b));
        assert!(!a.same_pool(&BufferPool::new(PACKET_SIZE)));
    }
}
