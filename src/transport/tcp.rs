//! TCP transport implementation
//!
//! Binds inbound listeners and opens outbound connections from a chosen
//! local interface address.

use super::SocketOpts;
use crate::config::RelayConfig;
use crate::error::{RelayError, SetupStage};
use crate::helper::{duration_from_secs, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LISTEN_BACKLOG};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// TCP transport for the relay's inbound and outbound sockets
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Outbound connection timeout
    connect_timeout: Duration,
    /// Listen backlog for inbound sockets
    listen_backlog: u32,
}

impl TcpTransport {
    /// Create a new TCP transport with default options
    pub fn with_defaults() -> Self {
        TcpTransport {
            socket_opts: SocketOpts::default(),
            connect_timeout: duration_from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
        }
    }

    /// Create a transport from relay configuration
    pub fn new(config: &RelayConfig) -> Self {
        TcpTransport {
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            connect_timeout: duration_from_secs(config.connect_timeout),
            listen_backlog: config.listen_backlog,
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Socket options applied to relayed connections
    pub fn socket_opts(&self) -> &SocketOpts {
        &self.socket_opts
    }

    /// Bind a listener on `addr`; port 0 asks the OS for an ephemeral port
    pub fn listen(&self, addr: SocketAddr) -> Result<TcpListener, RelayError> {
        let socket =
            new_socket(&addr).map_err(|e| RelayError::setup(SetupStage::Bind, e))?;
        socket
            .bind(addr)
            .map_err(|e| RelayError::setup(SetupStage::Bind, e))?;
        let listener = socket
            .listen(self.listen_backlog)
            .map_err(|e| RelayError::setup(SetupStage::Listen, e))?;

        tracing::debug!("Listening on {:?}", listener.local_addr().ok());

        Ok(listener)
    }

    /// Connect to `destination` from an ephemeral port on `local`
    pub async fn connect(
        &self,
        local: IpAddr,
        destination: SocketAddr,
    ) -> Result<TcpStream, RelayError> {
        let socket = new_socket(&destination)
            .and_then(|socket| socket.bind(SocketAddr::new(local, 0)).map(|_| socket))
            .map_err(|e| RelayError::setup(SetupStage::OutboundBind, e))?;

        let stream = match tokio::time::timeout(self.connect_timeout, socket.connect(destination))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(RelayError::setup(SetupStage::Connect, e)),
            Err(_) => {
                let e = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", destination),
                );
                return Err(RelayError::setup(SetupStage::Connect, e));
            }
        };

        self.hint(&stream);

        tracing::debug!(
            "TCP connection established {:?} -> {}",
            stream.local_addr().ok(),
            destination
        );

        Ok(stream)
    }

    /// Apply socket options, logging instead of failing
    pub fn hint(&self, stream: &TcpStream) {
        if let Err(e) = self.socket_opts.apply(stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }
    }
}

fn new_socket(addr: &SocketAddr) -> io::Result<TcpSocket> {
    if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}
