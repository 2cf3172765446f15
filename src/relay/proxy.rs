//! Proxy instance
//!
//! One proxy instance serves one route. It owns the listening socket (via
//! its acceptor task) and the table of live connection pairs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::acceptor::{Acceptor, ConnectContext};
use super::events::EventSink;
use super::pair::{PairIdGenerator, PairTable};
use super::{Route, RouteKey};
use crate::error::{RelayError, SetupStage};
use crate::pool::BufferPool;
use crate::transport::TcpTransport;

/// Whether a proxy is still accepting clients
#[derive(Debug)]
pub(crate) struct ProxyState {
    running: AtomicBool,
}

impl ProxyState {
    pub fn new() -> Self {
        ProxyState {
            running: AtomicBool::new(true),
        }
    }

    pub fn mark_failed(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A running proxy bound to one route
pub struct ProxyInstance {
    route: Route,
    key: RouteKey,
    local_addr: SocketAddr,
    table: Arc<PairTable>,
    state: Arc<ProxyState>,
    shutdown_tx: watch::Sender<bool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyInstance {
    /// Bind the listener for `route` and start accepting clients
    pub fn start(
        route: Route,
        transport: Arc<TcpTransport>,
        pool: BufferPool,
        events: EventSink,
    ) -> Result<Self, RelayError> {
        let key = route.key();
        let listener = transport.listen(route.listen_addr())?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::setup(SetupStage::Listen, e))?;

        let table = Arc::new(PairTable::new());
        let state = Arc::new(ProxyState::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = ConnectContext {
            route,
            key,
            transport,
            pool,
            table: table.clone(),
            events,
            ids: PairIdGenerator::new(),
        };
        let acceptor = Acceptor::new(listener, ctx, state.clone(), shutdown_rx);
        let handle = tokio::spawn(acceptor.run());

        info!(
            route = %key,
            "Proxy listening on {} -> {} (outbound from {})",
            local_addr, route.destination, route.outbound
        );

        Ok(ProxyInstance {
            route,
            key,
            local_addr,
            table,
            state,
            shutdown_tx,
            acceptor: Mutex::new(Some(handle)),
        })
    }

    /// Route served by this proxy
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Registry key of this proxy
    pub fn key(&self) -> RouteKey {
        self.key
    }

    /// OS-assigned inbound port
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// False once the listener has failed or the proxy was closed
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Number of live connection pairs
    pub async fn active_pairs(&self) -> usize {
        self.table.len().await
    }

    /// Close the listener, then every live pair
    ///
    /// Every pair is closed even if some fail; the last error is returned.
    /// Closing twice is harmless.
    pub async fn close(&self) -> Result<(), RelayError> {
        self.state.mark_failed();
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.acceptor.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(route = %self.key, "Acceptor task ended abnormally: {}", e);
            }
        }

        let pairs = self.table.close().await;
        let count = pairs.len();
        let results =
            futures::future::join_all(pairs.into_iter().map(|(_, handle)| handle.close())).await;

        let mut last = Ok(());
        for result in results {
            if let Err(e) = result {
                debug!(route = %self.key, "Error closing pair: {}", e);
                last = Err(RelayError::Io(e));
            }
        }

        info!(route = %self.key, pairs = count, "Proxy closed");
        last
    }
}

impl Drop for ProxyInstance {
    fn drop(&mut self) {
        // Stop accepting even if close() was never called
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("route", &self.route)
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn route(destination: SocketAddr) -> Route {
        Route::new(
            "127.0.0.1".parse().unwrap(),
            "127.0.0.1".parse().unwrap(),
            destination,
        )
    }

    fn start(destination: SocketAddr, pool: &BufferPool) -> ProxyInstance {
        ProxyInstance::start(
            route(destination),
            Arc::new(TcpTransport::with_defaults()),
            pool.clone(),
            EventSink::disabled(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let pool = BufferPool::new(1024);
        let proxy = start("127.0.0.1:9".parse().unwrap(), &pool);
        assert_ne!(proxy.port(), 0);
        assert!(proxy.is_running());
        assert_eq!(proxy.key(), proxy.route().key());
        assert_eq!(proxy.active_pairs().await, 0);
    }

    #[tokio::test]
    async fn test_start_on_foreign_interface_fails() {
        let route = Route::new(
            "192.0.2.1".parse().unwrap(),
            "127.0.0.1".parse().unwrap(),
            "127.0.0.1:9".parse().unwrap(),
        );
        let err = ProxyInstance::start(
            route,
            Arc::new(TcpTransport::with_defaults()),
            BufferPool::new(1024),
            EventSink::disabled(),
        )
        .unwrap_err();
        assert_eq!(err.setup_stage(), Some(SetupStage::Bind));
    }

    #[tokio::test]
    async fn test_close_drops_live_pairs() {
        let dest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let pool = BufferPool::new(1024);
        let proxy = start(dest.local_addr().unwrap(), &pool);

        let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
        let (mut server, _) = dest.accept().await.unwrap();
        client.write_all(b"x").await.unwrap();
        let mut one = [0u8; 1];
        server.read_exact(&mut one).await.unwrap();
        assert_eq!(proxy.active_pairs().await, 1);

        proxy.close().await.unwrap();
        assert!(!proxy.is_running());
        assert_eq!(proxy.active_pairs().await, 0);

        let mut rest = Vec::new();
        let _ = client.read_to_end(&mut rest).await;
        let _ = server.read_to_end(&mut rest).await;
        assert!(rest.is_empty());
        assert!(TcpStream::connect(proxy.local_addr()).await.is_err());

        // Second close is a no-op
        proxy.close().await.unwrap();
    }
}
