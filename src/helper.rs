//! Helper utilities for Portrelay
//!
//! Common constants and small address utilities used throughout the crate.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::error::RelayError;

/// Size of one relay packet; bounds a single read or write
pub const PACKET_SIZE: usize = 16 * 1024;

/// Default outbound connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default listen backlog for inbound sockets
pub const DEFAULT_LISTEN_BACKLOG: u32 = 1024;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Parse an interface address such as `"192.168.1.5"` or `"::1"`
pub fn parse_interface_addr(addr: &str) -> Result<IpAddr, RelayError> {
    addr.trim()
        .parse::<IpAddr>()
        .map_err(|e| RelayError::Address(format!("{}: {}", addr, e)))
}

/// Parse a destination such as `"10.0.0.2:9000"` or `"[::1]:9000"`
pub fn parse_destination(addr: &str) -> Result<SocketAddr, RelayError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map_err(|e| RelayError::Address(format!("{}: {}", addr, e)))
}

/// Unspecified address of the same family as `addr`
pub fn unspecified_like(addr: &IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(PACKET_SIZE, 16384);
        assert_eq!(DEFAULT_CONNECT_TIMEOUT_SECS, 10);
        assert_eq!(DEFAULT_LISTEN_BACKLOG, 1024);
    }

    #[test]
    fn test_duration_from_secs() {
        assert_eq!(duration_from_secs(5), Duration::from_secs(5));
        assert_eq!(duration_from_secs(0), Duration::from_secs(0));
    }

    #[test]
    fn test_parse_interface_addr() {
        assert_eq!(
            parse_interface_addr("127.0.0.1").unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(
            parse_interface_addr(" ::1 ").unwrap(),
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        );
        assert!(matches!(
            parse_interface_addr("not-an-ip"),
            Err(RelayError::Address(_))
        ));
    }

    #[test]
    fn test_parse_destination() {
        let addr = parse_destination("10.0.0.2:9000").unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(parse_destination("[::1]:80").unwrap().is_ipv6());
        assert!(parse_destination("10.0.0.2").is_err());
    }

    #[test]
    fn test_unspecified_like() {
        let v4: IpAddr = "10.1.2.3".parse().unwrap();
        let v6: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(unspecified_like(&v4), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(unspecified_like(&v6), IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    }
}
