//! Relay configuration types
//!
//! Defines the root configuration, relay engine settings and proxy routes.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use super::{PoolConfig, TcpConfig};
use crate::helper::{
    unspecified_like, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LISTEN_BACKLOG,
};
use crate::relay::Route;

/// Default connect timeout in seconds
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Default listen backlog
fn default_listen_backlog() -> u32 {
    DEFAULT_LISTEN_BACKLOG
}

/// Default transfer failure reporting
fn default_report_transfer_failures() -> bool {
    true
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Relay engine configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Proxy routes to create at startup
    #[serde(default, rename = "proxy")]
    pub proxies: Vec<ProxyConfig>,
}

impl Config {
    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), String> {
        self.relay.validate()?;
        for proxy in &self.proxies {
            proxy.validate()?;
        }
        Ok(())
    }
}

/// Relay engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Outbound connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Listen backlog for inbound sockets
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,

    /// Emit an event for every mid-stream read/write failure
    #[serde(default = "default_report_transfer_failures")]
    pub report_transfer_failures: bool,

    /// Socket options for both sides of a connection
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Buffer pool configuration
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            connect_timeout: default_connect_timeout(),
            listen_backlog: default_listen_backlog(),
            report_transfer_failures: default_report_transfer_failures(),
            tcp: TcpConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Validate the relay configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.listen_backlog == 0 {
            return Err("listen_backlog must be greater than 0".to_string());
        }
        self.pool.validate()
    }
}

/// One proxy route
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address of the interface to accept clients on
    pub inbound: IpAddr,

    /// Address of the interface to connect from; defaults to any address
    #[serde(default)]
    pub outbound: Option<IpAddr>,

    /// Destination every client is relayed to
    pub destination: SocketAddr,
}

impl ProxyConfig {
    /// Validate the route
    pub fn validate(&self) -> Result<(), String> {
        if self.destination.port() == 0 {
            return Err(format!("destination {} has no port", self.destination));
        }
        if let Some(outbound) = self.outbound {
            if outbound.is_ipv4() != self.destination.is_ipv4() {
                return Err(format!(
                    "outbound {} and destination {} use different address families",
                    outbound, self.destination
                ));
            }
        }
        Ok(())
    }

    /// Route triple for this proxy
    pub fn route(&self) -> Route {
        let outbound = self
            .outbound
            .unwrap_or_else(|| unspecified_like(&self.destination.ip()));
        Route::new(self.inbound, outbound, self.destination)
    }
}
