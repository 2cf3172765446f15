//! Acceptor and connector
//!
//! Turns one listening socket into a stream of connection pairs. Every
//! accepted client gets its own connector task, so a slow or failing
//! outbound connect never holds up the next accept.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::events::EventSink;
use super::pair::{ConnectionPair, PairIdGenerator, PairTable};
use super::proxy::ProxyState;
use super::{Route, RouteKey};
use crate::error::{RelayError, SetupStage};
use crate::pool::BufferPool;
use crate::transport::TcpTransport;

/// Everything a connector needs, cloned once per accepted client
#[derive(Clone)]
pub(crate) struct ConnectContext {
    pub route: Route,
    pub key: RouteKey,
    pub transport: Arc<TcpTransport>,
    pub pool: BufferPool,
    pub table: Arc<PairTable>,
    pub events: EventSink,
    pub ids: PairIdGenerator,
}

/// Accept loop of one proxy instance
pub(crate) struct Acceptor {
    listener: TcpListener,
    ctx: ConnectContext,
    state: Arc<ProxyState>,
    shutdown: watch::Receiver<bool>,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        ctx: ConnectContext,
        state: Arc<ProxyState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Acceptor {
            listener,
            ctx,
            state,
            shutdown,
        }
    }

    /// Accept clients until shutdown or a listener failure
    ///
    /// The listener is dropped, and so closed, when this returns.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    debug!(route = %self.ctx.key, "Acceptor shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((inbound, peer)) => {
                        debug!(route = %self.ctx.key, peer = %peer, "Accepted client");
                        let ctx = self.ctx.clone();
                        let shutdown = self.shutdown.clone();
                        tokio::spawn(connect_and_relay(ctx, inbound, peer, shutdown));
                    }
                    Err(e) => {
                        error!(route = %self.ctx.key, "Accept failed, proxy stops listening: {}", e);
                        self.state.mark_failed();
                        let err = RelayError::Listener(e);
                        self.ctx.events.setup_failure(&self.ctx.key, SetupStage::Accept, &err);
                        break;
                    }
                }
            }
        }

        info!(route = %self.ctx.key, "Stopped accepting clients");
    }
}

/// Open the outbound side for one client and run the resulting pair
async fn connect_and_relay(
    ctx: ConnectContext,
    inbound: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    ctx.transport.hint(&inbound);

    let connected = tokio::select! {
        _ = shutdown.changed() => {
            debug!(route = %ctx.key, peer = %peer, "Proxy closed while connecting");
            return;
        }
        connected = ctx.transport.connect(ctx.route.outbound, ctx.route.destination) => connected,
    };

    let outbound = match connected {
        Ok(outbound) => outbound,
        Err(e) => {
            warn!(
                route = %ctx.key,
                peer = %peer,
                "Outbound connection to {} failed: {}",
                ctx.route.destination,
                e
            );
            let stage = e.setup_stage().unwrap_or(SetupStage::Connect);
            ctx.events.setup_failure(&ctx.key, stage, &e);
            // Dropping the inbound stream closes the client connection
            return;
        }
    };

    let id = ctx.ids.generate();
    let (pair, handle) = ConnectionPair::new(
        id,
        ctx.key,
        peer,
        inbound,
        outbound,
        ctx.pool.clone(),
        &ctx.table,
        ctx.events.clone(),
    );

    if !ctx.table.insert(pair.id(), handle).await {
        debug!(route = %ctx.key, pair = %pair.id(), "Proxy closed before pair could start");
        return;
    }

    pair.run().await;
}
