//! # Portrelay - TCP Relay Engine
//!
//! Portrelay forwards TCP connections arriving on an OS-assigned port of a
//! chosen local interface to a fixed destination, originating the outbound
//! connection from a chosen local interface. Bytes are copied in both
//! directions through a shared pool of fixed-size buffers.
//!
//! ## Features
//!
//! - **Idempotent Proxies**: One listener per (inbound, outbound, destination) route
//! - **Full Duplex Pumps**: The next read overlaps the in-flight write
//! - **Buffer Pooling**: Packet buffers are recycled, never leaked on errors
//! - **Failure Isolation**: A failing connection never disturbs its neighbours
//!
//! ## Usage
//!
//! ```rust,ignore
//! use portrelay::{Registry, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Registry::new(&RelayConfig::default());
//!     let port = registry
//!         .create_proxy(
//!             "127.0.0.1".parse()?,
//!             "0.0.0.0".parse()?,
//!             "10.0.0.2:9000".parse()?,
//!         )
//!         .await?;
//!     println!("clients connect to 127.0.0.1:{}", port);
//!
//!     registry.close_all().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client -> Inbound Listener -> Pair (2 pumps) -> Outbound Socket -> Destination
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod pool;
pub mod relay;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config, RelayConfig};
pub use error::{RelayError, TransferError};
pub use pool::BufferPool;
pub use relay::{ProxyEvent, Registry, Route, RouteKey};

/// Version of the Portrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
