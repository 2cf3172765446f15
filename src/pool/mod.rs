//! Buffer pool module for Portrelay
//!
//! This module provides the transfer buffers every relay pump reads into.
//! Buffers are reused across all connections to avoid per-read allocation.

mod buffer;
mod guard;
mod stats;

pub use buffer::BufferPool;
pub use guard::PooledBuffer;
pub use stats::{PoolStats, PoolStatsSnapshot};

use crate::config::PoolConfig;
use crate::helper::PACKET_SIZE;

/// Create a pool from configuration, preallocating the requested buffers
///
/// The default packet size shares the process-wide pool, which is only
/// topped up to `prealloc_buffers` so repeated calls do not grow it.
pub fn create_pool(config: &PoolConfig) -> BufferPool {
    if config.packet_size == PACKET_SIZE {
        let pool = BufferPool::global();
        pool.fill_to(config.prealloc_buffers);
        pool
    } else {
        let pool = BufferPool::new(config.packet_size);
        pool.preallocate(config.prealloc_buffers);
        pool
    }
}
