//! Buffer pool configuration
//!
//! Defines the size of relay packets and how many buffers to allocate up front.

use serde::{Deserialize, Serialize};

use crate::helper::PACKET_SIZE;

/// Default packet size in bytes
fn default_packet_size() -> usize {
    PACKET_SIZE
}

/// Buffer pool configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Capacity of each transfer buffer; bounds a single read or write
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// Number of buffers allocated into the pool at startup
    #[serde(default)]
    pub prealloc_buffers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            packet_size: default_packet_size(),
            prealloc_buffers: 0,
        }
    }
}

impl PoolConfig {
    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.packet_size == 0 {
            return Err("packet_size must be greater than 0".to_string());
        }
        Ok(())
    }
}
