//! Proxy registry
//!
//! The single owner of all proxy instances. Creation is idempotent per
//! route, and the lock is held across the bind so two concurrent creates of
//! the same route can never produce two listeners.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::events::{EventReceiver, EventSink};
use super::proxy::ProxyInstance;
use super::{Route, RouteKey};
use crate::config::RelayConfig;
use crate::error::{RelayError, SetupStage};
use crate::pool::{create_pool, BufferPool};
use crate::transport::TcpTransport;

/// Snapshot of one registered proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInfo {
    /// Registry key
    pub key: RouteKey,
    /// Inbound port clients connect to
    pub port: u16,
    /// False once the listener failed
    pub running: bool,
    /// Live connection pairs
    pub active_pairs: usize,
}

/// Keyed collection of proxy instances
pub struct Registry {
    proxies: Mutex<HashMap<RouteKey, Arc<ProxyInstance>>>,
    transport: Arc<TcpTransport>,
    pool: BufferPool,
    events: EventSink,
    report_transfer_failures: bool,
}

impl Registry {
    /// Create a registry with its own buffer pool and no event channel
    pub fn new(config: &RelayConfig) -> Self {
        Registry {
            proxies: Mutex::new(HashMap::new()),
            transport: Arc::new(TcpTransport::new(config)),
            pool: create_pool(&config.pool),
            events: EventSink::disabled(),
            report_transfer_failures: config.report_transfer_failures,
        }
    }

    /// Use `pool` for every proxy created from now on
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    /// Attach an event channel; the caller drains the returned receiver
    pub fn with_events(mut self) -> (Self, EventReceiver) {
        let (events, rx) = EventSink::channel(self.report_transfer_failures);
        self.events = events;
        (self, rx)
    }

    /// Buffer pool shared by every proxy of this registry
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Create a proxy for the triple, or return the port of the existing one
    pub async fn create_proxy(
        &self,
        inbound: IpAddr,
        outbound: IpAddr,
        destination: SocketAddr,
    ) -> Result<u16, RelayError> {
        self.create(Route::new(inbound, outbound, destination)).await
    }

    /// Create a proxy for `route`, or return the port of the existing one
    pub async fn create(&self, route: Route) -> Result<u16, RelayError> {
        if route.outbound.is_ipv4() != route.destination.is_ipv4() {
            return Err(RelayError::Address(format!(
                "outbound {} cannot reach destination {}: address families differ",
                route.outbound, route.destination
            )));
        }

        let key = route.key();
        let mut proxies = self.proxies.lock().await;

        if let Some(existing) = proxies.get(&key) {
            debug!(route = %key, "Proxy already exists on port {}", existing.port());
            return Ok(existing.port());
        }

        let proxy = match ProxyInstance::start(
            route,
            self.transport.clone(),
            self.pool.clone(),
            self.events.clone(),
        ) {
            Ok(proxy) => proxy,
            Err(e) => {
                error!(route = %key, "Failed to create proxy: {}", e);
                let stage = e.setup_stage().unwrap_or(SetupStage::Bind);
                self.events.setup_failure(&key, stage, &e);
                return Err(e);
            }
        };

        let port = proxy.port();
        proxies.insert(key, Arc::new(proxy));
        Ok(port)
    }

    /// Remove the proxy for `key` and close it
    pub async fn close_proxy(&self, key: &RouteKey) -> Result<(), RelayError> {
        let proxy = self
            .proxies
            .lock()
            .await
            .remove(key)
            .ok_or(RelayError::NotFound(*key))?;

        proxy.close().await
    }

    /// Close every proxy, returning the last error encountered
    pub async fn close_all(&self) -> Result<(), RelayError> {
        let proxies: Vec<_> = self.proxies.lock().await.drain().collect();
        info!("Closing {} proxies", proxies.len());

        let mut last = Ok(());
        for (key, proxy) in proxies {
            if let Err(e) = proxy.close().await {
                error!(route = %key, "Error closing proxy: {}", e);
                last = Err(e);
            }
        }
        last
    }

    /// Keys of every registered proxy
    pub async fn routes(&self) -> Vec<RouteKey> {
        self.proxies.lock().await.keys().copied().collect()
    }

    /// Whether a proxy is registered for `key`
    pub async fn contains(&self, key: &RouteKey) -> bool {
        self.proxies.lock().await.contains_key(key)
    }

    /// Snapshot of the proxy registered for `key`
    pub async fn get(&self, key: &RouteKey) -> Option<ProxyInfo> {
        let proxy = self.proxies.lock().await.get(key).cloned()?;
        Some(ProxyInfo {
            key: *key,
            port: proxy.port(),
            running: proxy.is_running(),
            active_pairs: proxy.active_pairs().await,
        })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("transport", &self.transport)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::ProxyEvent;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let registry = Registry::new(&RelayConfig::default());
        let dest = "127.0.0.1:9".parse().unwrap();

        let first = registry.create_proxy(localhost(), localhost(), dest).await.unwrap();
        let second = registry.create_proxy(localhost(), localhost(), dest).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.routes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_routes_get_distinct_ports() {
        let registry = Registry::new(&RelayConfig::default());
        let a = registry
            .create_proxy(localhost(), localhost(), "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();
        let b = registry
            .create_proxy(localhost(), localhost(), "127.0.0.1:10".parse().unwrap())
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.routes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_close_proxy_removes_route() {
        let registry = Registry::new(&RelayConfig::default());
        let route = Route::new(localhost(), localhost(), "127.0.0.1:9".parse().unwrap());
        registry.create(route).await.unwrap();
        assert!(registry.contains(&route.key()).await);

        registry.close_proxy(&route.key()).await.unwrap();
        assert!(!registry.contains(&route.key()).await);
        assert!(registry.get(&route.key()).await.is_none());
    }

    #[tokio::test]
    async fn test_close_unknown_route() {
        let registry = Registry::new(&RelayConfig::default());
        let key = Route::new(localhost(), localhost(), "127.0.0.1:9".parse().unwrap()).key();
        let err = registry.close_proxy(&key).await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
        assert!(format!("{}", err).contains("127.0.0.1_127.0.0.1_127.0.0.1:9"));
    }

    #[tokio::test]
    async fn test_get_reports_proxy_info() {
        let registry = Registry::new(&RelayConfig::default());
        let route = Route::new(localhost(), localhost(), "127.0.0.1:9".parse().unwrap());
        let port = registry.create(route).await.unwrap();

        let info = registry.get(&route.key()).await.unwrap();
        assert_eq!(info.port, port);
        assert!(info.running);
        assert_eq!(info.active_pairs, 0);
    }

    #[tokio::test]
    async fn test_failed_create_reports_setup_failure() {
        let (registry, mut events) = Registry::new(&RelayConfig::default()).with_events();
        let route = Route::new(
            "192.0.2.1".parse().unwrap(),
            localhost(),
            "127.0.0.1:9".parse().unwrap(),
        );

        let err = registry.create(route).await.unwrap_err();
        assert!(err.describe().starts_with("SetupError"));
        assert!(registry.routes().await.is_empty());

        match events.try_recv().unwrap() {
            ProxyEvent::SetupFailure { stage, .. } => assert_eq!(stage, SetupStage::Bind),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_mixed_address_families() {
        let registry = Registry::new(&RelayConfig::default());
        let err = registry
            .create_proxy(localhost(), localhost(), "[::1]:9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Address(_)));
        assert!(registry.routes().await.is_empty());

        let err = registry
            .create_proxy(localhost(), "::".parse().unwrap(), "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Address(_)));
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = Registry::new(&RelayConfig::default());
        for port in 9..12 {
            registry
                .create_proxy(localhost(), localhost(), SocketAddr::new(localhost(), port))
                .await
                .unwrap();
        }
        assert_eq!(registry.routes().await.len(), 3);

        registry.close_all().await.unwrap();
        assert!(registry.routes().await.is_empty());
    }

    #[tokio::test]
    async fn test_with_pool_shares_pool() {
        let pool = BufferPool::new(512);
        let registry = Registry::new(&RelayConfig::default()).with_pool(pool.clone());
        assert_eq!(registry.pool().packet_size(), 512);
    }
}
