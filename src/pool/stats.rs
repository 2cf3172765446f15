//! Buffer pool statistics
//!
//! Counters describing how the pool is being used.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for the buffer pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Buffers allocated because no pooled buffer qualified
    pub allocations: AtomicUsize,
    /// Acquisitions satisfied from the free list
    pub reuses: AtomicUsize,
    /// Buffers returned to the free list
    pub releases: AtomicUsize,
    /// Buffers dropped after an IO failure
    pub abandoned: AtomicUsize,
    /// Buffers currently on loan
    pub in_use: AtomicUsize,
}

impl PoolStats {
    /// Create new pool stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh allocation handed to a caller
    pub fn record_allocated(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reuse from the free list
    pub fn record_reused(&self) {
        self.reuses.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a buffer coming back to the free list
    pub fn record_released(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a buffer that was thrown away
    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self, available: usize) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
            available,
        }
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Fresh allocations
    pub allocations: usize,
    /// Acquires served from the free list
    pub reuses: usize,
    /// Buffers returned to the free list
    pub releases: usize,
    /// Buffers discarded after an IO error
    pub abandoned: usize,
    /// Buffers currently held by pumps
    pub in_use: usize,
    /// Buffers sitting in the free list
    pub available: usize,
}
