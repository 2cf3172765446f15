//! Route identity
//!
//! A route is the (inbound interface, outbound interface, destination) triple
//! a proxy instance serves. Its key identifies the instance in the registry.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// The endpoints one proxy instance relays between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    /// Interface address clients connect to
    pub inbound: IpAddr,
    /// Interface address outbound connections originate from
    pub outbound: IpAddr,
    /// Where every client is relayed to
    pub destination: SocketAddr,
}

impl Route {
    /// Create a new route
    pub fn new(inbound: IpAddr, outbound: IpAddr, destination: SocketAddr) -> Self {
        Route {
            inbound,
            outbound,
            destination,
        }
    }

    /// Registry key for this route
    pub fn key(&self) -> RouteKey {
        RouteKey(*self)
    }

    /// Listener address: the inbound interface with an ephemeral port
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.inbound, 0)
    }
}

/// Identity of a proxy instance; equal triples give equal keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey(Route);

impl RouteKey {
    /// The route this key identifies
    pub fn route(&self) -> &Route {
        &self.0
    }
}

impl From<Route> for RouteKey {
    fn from(route: Route) -> Self {
        route.key()
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.0.inbound, self.0.outbound, self.0.destination
        )
    }
}
