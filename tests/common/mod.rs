//! Test utilities for Portrelay
//!
//! Destination servers and helpers shared by the integration tests.

#![allow(dead_code)]

use portrelay::{RelayConfig, Registry, Route};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Loopback interface used on both sides of every test proxy
pub fn localhost() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Address nothing is listening on
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Destination that writes back everything it reads, for any number of clients
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

/// Destination that answers a single `PING` with `PONG`
pub async fn spawn_ping_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                if stream.read_exact(&mut buf).await.is_ok() && &buf == b"PING" {
                    let _ = stream.write_all(b"PONG").await;
                }
                let mut rest = Vec::new();
                let _ = stream.read_to_end(&mut rest).await;
            });
        }
    });
    addr
}

/// Destination that greets every client with `banner` before reading, then echoes
pub async fn spawn_banner_server(banner: &'static [u8]) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                if writer.write_all(banner).await.is_ok() {
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                }
            });
        }
    });
    addr
}

/// Destination whose first connection is reset after `trigger` bytes arrive;
/// every later connection is echoed
///
/// The receiver fires once the first connection has been accepted.
pub async fn spawn_reset_once_server(trigger: usize) -> (SocketAddr, oneshot::Receiver<()>) {
    let (listener, addr) = create_test_listener().await;
    let (accepted_tx, accepted_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        let _ = accepted_tx.send(());
        tokio::spawn(async move {
            let mut buf = vec![0u8; trigger];
            let _ = first.read_exact(&mut buf).await;
            // Zero linger turns the close into a reset
            let _ = socket2::SockRef::from(&first).set_linger(Some(Duration::ZERO));
            drop(first);
        });

        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    (addr, accepted_rx)
}

/// Destination that accepts one client and reports the length and digest of
/// everything it received before EOF
pub async fn spawn_sink_server() -> (SocketAddr, JoinHandle<(usize, Vec<u8>)>) {
    let (listener, addr) = create_test_listener().await;
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        (received.len(), digest(&received))
    });
    (addr, handle)
}

/// SHA-256 of `data`
pub fn digest(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// `len` random bytes
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Registry with default settings
pub fn create_registry() -> Registry {
    Registry::new(&RelayConfig::default())
}

/// Loopback route to `destination`
pub fn loopback_route(destination: SocketAddr) -> Route {
    Route::new(localhost(), localhost(), destination)
}

/// Create a loopback proxy to `destination` and connect a client to it
pub async fn connect_through(registry: &Registry, destination: SocketAddr) -> TcpStream {
    let port = registry.create(loopback_route(destination)).await.unwrap();
    TcpStream::connect(SocketAddr::new(localhost(), port)).await.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
        assert_eq!(digest(b"").len(), 32);
    }

    #[tokio::test]
    async fn test_echo_server() {
        let addr = spawn_echo_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }
}
