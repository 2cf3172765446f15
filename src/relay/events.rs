//! Observability events
//!
//! Failures the controlling application may want to hear about. Events are
//! queued on a channel and the application drains them on a thread of its
//! choosing; nothing in the relay depends on them being consumed.

use std::fmt;
use std::io;
use tokio::sync::mpsc;

use super::{PairId, RouteKey};
use crate::error::{Direction, RelayError, SetupStage, TransferError, TransferStage};

/// Receiving end of the event channel
pub type EventReceiver = mpsc::UnboundedReceiver<ProxyEvent>;

/// Something that went wrong inside a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// Listener or connect-time failure
    SetupFailure {
        /// Proxy the failure belongs to
        route: RouteKey,
        /// Stage that failed; `Accept` means the proxy stopped listening
        stage: SetupStage,
        /// Kind of the underlying IO error, if any
        kind: Option<io::ErrorKind>,
        /// Human-readable description
        message: String,
    },
    /// Mid-stream failure of one connection pair
    ConnectionFailure {
        /// Proxy the pair belongs to
        route: RouteKey,
        /// Pair that failed
        pair: PairId,
        /// Direction of the pump that failed
        direction: Direction,
        /// Read or write
        stage: TransferStage,
        /// Kind of the underlying IO error
        kind: io::ErrorKind,
        /// Human-readable description
        message: String,
    },
}

impl ProxyEvent {
    /// Route the event belongs to
    pub fn route(&self) -> &RouteKey {
        match self {
            ProxyEvent::SetupFailure { route, .. } | ProxyEvent::ConnectionFailure { route, .. } => {
                route
            }
        }
    }

    /// Whether the proxy is no longer accepting clients
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProxyEvent::SetupFailure { stage, .. } if stage.is_fatal())
    }
}

impl fmt::Display for ProxyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyEvent::SetupFailure {
                route,
                stage,
                message,
                ..
            } => write!(f, "Setup exception from {} on {}: {}", stage, route, message),
            ProxyEvent::ConnectionFailure {
                route,
                pair,
                stage,
                message,
                ..
            } => write!(
                f,
                "Connection exception from {} on {} pair {}: {}",
                stage, route, pair, message
            ),
        }
    }
}

/// Sending side shared by every task of a registry
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ProxyEvent>>,
    report_transfer_failures: bool,
}

impl EventSink {
    /// A sink that drops every event
    pub fn disabled() -> Self {
        EventSink::default()
    }

    /// A sink paired with the receiver the application drains
    pub fn channel(report_transfer_failures: bool) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink {
            tx: Some(tx),
            report_transfer_failures,
        };
        (sink, rx)
    }

    /// Report a listener or connect-time failure
    pub fn setup_failure(&self, route: &RouteKey, stage: SetupStage, error: &RelayError) {
        self.emit(ProxyEvent::SetupFailure {
            route: *route,
            stage,
            kind: error.io_kind(),
            message: error.describe(),
        });
    }

    /// Report a mid-stream failure, if enabled
    pub fn connection_failure(&self, route: &RouteKey, pair: PairId, error: &TransferError) {
        if !self.report_transfer_failures {
            return;
        }
        self.emit(ProxyEvent::ConnectionFailure {
            route: *route,
            pair,
            direction: error.direction(),
            stage: error.stage(),
            kind: error.io_error().kind(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: ProxyEvent) {
        if let Some(tx) = &self.tx {
            // The application may have stopped listening
            let _ = tx.send(event);
        }
    }
}
