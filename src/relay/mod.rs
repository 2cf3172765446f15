//! Relay engine
//!
//! ```text
//! Registry -> ProxyInstance -> Acceptor -> ConnectionPair -> 2x Pump
//!                                                              |
//!                                                         BufferPool
//! ```
//!
//! The [`Registry`] is the only entry point for the controlling application.
//! Pumps, pairs and buffers are internal to the proxy that owns them.

mod acceptor;
mod events;
mod pair;
mod proxy;
mod pump;
mod registry;
mod route;

pub use events::{EventReceiver, EventSink, ProxyEvent};
pub use pair::{close, close_silently, ConnectionPair, PairHandle, PairId, PairIdGenerator, PairTable};
pub use proxy::ProxyInstance;
pub use pump::Pump;
pub use registry::{ProxyInfo, Registry};
pub use route::{Route, RouteKey};
