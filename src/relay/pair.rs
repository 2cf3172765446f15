//! Connection pairs
//!
//! A pair is the client-facing socket plus the destination-facing socket of
//! one relayed session. Both sockets share one fate: whichever pump stops
//! first takes the other one down with it, and both sockets are closed.
//!
//! Live pairs are tracked in a per-proxy [`PairTable`], keyed by [`PairId`].
//! A pair only holds a weak reference to its table, never the proxy itself.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use super::events::EventSink;
use super::pump::Pump;
use super::RouteKey;
use crate::error::{Direction, TransferError};
use crate::pool::BufferPool;

/// Request to close a pair, carrying the channel the close result goes to
type CloseRequest = oneshot::Sender<io::Result<()>>;

/// Opaque handle of a connection pair within its proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairId(u64);

impl PairId {
    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        PairId(id)
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out pair ids for one proxy
#[derive(Debug, Clone)]
pub struct PairIdGenerator {
    next: Arc<AtomicU64>,
}

impl PairIdGenerator {
    /// Create a generator starting at 1
    pub fn new() -> Self {
        PairIdGenerator {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Next unused id
    pub fn generate(&self) -> PairId {
        PairId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PairIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Table entry for a live pair
#[derive(Debug)]
pub struct PairHandle {
    peer: SocketAddr,
    close_tx: oneshot::Sender<CloseRequest>,
}

impl PairHandle {
    /// Client address of the pair
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Stop both pumps and close both sockets, returning the last close error
    ///
    /// A pair that already finished on its own reports success.
    pub async fn close(self) -> io::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.close_tx.send(reply_tx).is_err() {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

#[derive(Debug, Default)]
struct TableState {
    closed: bool,
    pairs: HashMap<PairId, PairHandle>,
}

/// Concurrent set of live pairs belonging to one proxy
#[derive(Debug, Default)]
pub struct PairTable {
    state: Mutex<TableState>,
}

impl PairTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair; refused once the table has been closed
    pub async fn insert(&self, id: PairId, handle: PairHandle) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }
        state.pairs.insert(id, handle);
        true
    }

    /// Remove a pair; removing an absent pair is a no-op returning false
    pub async fn remove(&self, id: PairId) -> bool {
        self.state.lock().await.pairs.remove(&id).is_some()
    }

    /// Number of live pairs
    pub async fn len(&self) -> usize {
        self.state.lock().await.pairs.len()
    }

    /// Whether no pairs are live
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Refuse further inserts and hand back every live pair
    pub async fn close(&self) -> Vec<(PairId, PairHandle)> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.pairs.drain().collect()
    }
}

/// Why a pair stopped running
enum Ended {
    /// One of the pumps finished, cleanly or not
    Pump(Direction, Result<u64, TransferError>),
    /// The owning proxy asked the pair to close
    Closed(Option<CloseRequest>),
}

/// One relayed session, ready to run
pub struct ConnectionPair {
    id: PairId,
    route: RouteKey,
    peer: SocketAddr,
    inbound: TcpStream,
    outbound: TcpStream,
    pool: BufferPool,
    table: Weak<PairTable>,
    events: EventSink,
    close_rx: oneshot::Receiver<CloseRequest>,
}

impl ConnectionPair {
    /// Build a pair and the handle its proxy keeps in the pair table
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PairId,
        route: RouteKey,
        peer: SocketAddr,
        inbound: TcpStream,
        outbound: TcpStream,
        pool: BufferPool,
        table: &Arc<PairTable>,
        events: EventSink,
    ) -> (Self, PairHandle) {
        let (close_tx, close_rx) = oneshot::channel();
        let pair = ConnectionPair {
            id,
            route,
            peer,
            inbound,
            outbound,
            pool,
            table: Arc::downgrade(table),
            events,
            close_rx,
        };
        (pair, PairHandle { peer, close_tx })
    }

    /// Pair id
    pub fn id(&self) -> PairId {
        self.id
    }

    /// Run both pumps until one stops or the proxy closes the pair
    pub async fn run(self) {
        let ConnectionPair {
            id,
            route,
            peer,
            inbound,
            outbound,
            pool,
            table,
            events,
            mut close_rx,
        } = self;

        let (mut inbound_read, mut inbound_write) = inbound.into_split();
        let (mut outbound_read, mut outbound_write) = outbound.into_split();

        let upstream = Pump::new(id, Direction::InboundToOutbound, pool.clone());
        let downstream = Pump::new(id, Direction::OutboundToInbound, pool);

        debug!(route = %route, pair = %id, peer = %peer, "Pair started");

        let ended = tokio::select! {
            result = upstream.run(&mut inbound_read, &mut outbound_write) => {
                Ended::Pump(upstream.direction(), result)
            }
            result = downstream.run(&mut outbound_read, &mut inbound_write) => {
                Ended::Pump(downstream.direction(), result)
            }
            request = &mut close_rx => Ended::Closed(request.ok()),
        };

        match ended {
            Ended::Pump(direction, result) => {
                if let Some(table) = table.upgrade() {
                    table.remove(id).await;
                }
                match result {
                    Ok(_) => debug!(route = %route, pair = %id, %direction, "Stream reached EOF"),
                    Err(e) => {
                        debug!(route = %route, pair = %id, "Transfer failed: {}", e);
                        events.connection_failure(&route, id, &e);
                    }
                }
                close_silently(&mut inbound_write, &mut outbound_write).await;
            }
            Ended::Closed(reply) => {
                let result = close(&mut inbound_write, &mut outbound_write).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }

        info!(
            route = %route,
            pair = %id,
            peer = %peer,
            sent = upstream.forwarded(),
            received = downstream.forwarded(),
            "Pair closed"
        );
    }
}

/// Shut down both sockets, attempting both and returning the last error
pub async fn close(inbound: &mut OwnedWriteHalf, outbound: &mut OwnedWriteHalf) -> io::Result<()> {
    let mut last = Ok(());
    if let Err(e) = inbound.shutdown().await {
        last = Err(e);
    }
    if let Err(e) = outbound.shutdown().await {
        last = Err(e);
    }
    last
}

/// Like [`close`], but errors are swallowed
pub async fn close_silently(inbound: &mut OwnedWriteHalf, outbound: &mut OwnedWriteHalf) {
    if let Err(e) = close(inbound, outbound).await {
        debug!("Ignoring close error: {}", e);
    }
}
