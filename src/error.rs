//! Error types for Portrelay
//!
//! Errors are split into two families. [`RelayError`] covers everything that
//! is actionable by the caller (setup, listener and registry failures).
//! [`TransferError`] covers mid-stream failures of a single connection pair,
//! which never escape the pair and are only reported for observability.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::relay::RouteKey;

/// Main error type for Portrelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address could not be parsed or is unusable
    #[error("Invalid address: {0}")]
    Address(String),

    /// A proxy or connection could not be set up
    #[error("Setup failed during {stage}: {source}")]
    Setup {
        /// Stage that failed
        stage: SetupStage,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The listening socket failed; the proxy stopped accepting
    #[error("Listener failed: {0}")]
    Listener(#[source] io::Error),

    /// No proxy is registered for the route
    #[error("No proxy registered for route {0}")]
    NotFound(RouteKey),

    /// Mid-stream transfer failure
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl RelayError {
    /// Build a setup error for the given stage
    pub fn setup(stage: SetupStage, source: io::Error) -> Self {
        RelayError::Setup { stage, source }
    }

    /// Setup stage this error belongs to, if it is a setup or listener error
    pub fn setup_stage(&self) -> Option<SetupStage> {
        match self {
            RelayError::Setup { stage, .. } => Some(*stage),
            RelayError::Listener(_) => Some(SetupStage::Accept),
            _ => None,
        }
    }

    /// Underlying IO error kind, if any
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            RelayError::Io(e) | RelayError::Listener(e) => Some(e.kind()),
            RelayError::Setup { source, .. } => Some(source.kind()),
            RelayError::Transfer(e) => Some(e.io_error().kind()),
            _ => None,
        }
    }

    /// Human-readable "kind: detail" message for the controlling application
    pub fn describe(&self) -> String {
        let kind = match self {
            RelayError::Io(_) => "IoError",
            RelayError::Config(_) => "ConfigError",
            RelayError::Address(_) => "AddressError",
            RelayError::Setup { .. } => "SetupError",
            RelayError::Listener(_) => "ListenerError",
            RelayError::NotFound(_) => "NotFound",
            RelayError::Transfer(_) => "TransferError",
        };
        match self.io_kind() {
            Some(io_kind) => format!("{} ({:?}): {}", kind, io_kind, self),
            None => format!("{}: {}", kind, self),
        }
    }
}

/// Failure of one direction of a connection pair
#[derive(Error, Debug)]
pub enum TransferError {
    /// Reading from the source socket failed
    #[error("read failed ({direction}): {source}")]
    Read {
        /// Direction of the pump that failed
        direction: Direction,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Writing to the destination socket failed
    #[error("write failed ({direction}): {source}")]
    Write {
        /// Direction of the pump that failed
        direction: Direction,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Direction of the failed pump
    pub fn direction(&self) -> Direction {
        match self {
            TransferError::Read { direction, .. } | TransferError::Write { direction, .. } => {
                *direction
            }
        }
    }

    /// Stage at which the pump failed
    pub fn stage(&self) -> TransferStage {
        match self {
            TransferError::Read { .. } => TransferStage::Read,
            TransferError::Write { .. } => TransferStage::Write,
        }
    }

    /// The underlying IO error
    pub fn io_error(&self) -> &io::Error {
        match self {
            TransferError::Read { source, .. } | TransferError::Write { source, .. } => source,
        }
    }
}

/// Stage of proxy or connection setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStage {
    /// Binding the inbound listening socket
    Bind,
    /// Putting the inbound socket into listening state
    Listen,
    /// Accepting a client on the listener
    Accept,
    /// Opening or binding the outbound socket
    OutboundBind,
    /// Connecting the outbound socket to the destination
    Connect,
}

impl SetupStage {
    /// Whether a failure at this stage kills the whole proxy
    pub fn is_fatal(&self) -> bool {
        matches!(self, SetupStage::Bind | SetupStage::Listen | SetupStage::Accept)
    }
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::Bind => "bind",
            SetupStage::Listen => "listen",
            SetupStage::Accept => "accept",
            SetupStage::OutboundBind => "outbound bind",
            SetupStage::Connect => "connect",
        };
        f.write_str(name)
    }
}

/// Stage of a mid-stream transfer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStage {
    /// Read from the source socket
    Read,
    /// Write to the destination socket
    Write,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::Read => f.write_str("read"),
            TransferStage::Write => f.write_str("write"),
        }
    }
}

/// Direction of a relay pump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client-facing socket to destination-facing socket
    InboundToOutbound,
    /// Destination-facing socket to client-facing socket
    OutboundToInbound,
}

impl Direction {
    /// The opposite direction
    pub fn reverse(self) -> Self {
        match self {
            Direction::InboundToOutbound => Direction::OutboundToInbound,
            Direction::OutboundToInbound => Direction::InboundToOutbound,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::InboundToOutbound => f.write_str("inbound->outbound"),
            Direction::OutboundToInbound => f.write_str("outbound->inbound"),
        }
    }
}
