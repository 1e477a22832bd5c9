//! Error types for the node runtime

use linkstate_core::{ProtocolError, TransportError};
use linkstate_routing::RoutingError;
use thiserror::Error;

/// Errors that can occur in the node runtime
///
/// Only `Config` and `InvalidNeighbor` at construction are fatal. Everything
/// the protocol meets at runtime is logged and counted instead.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Invalid configuration detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected neighbor change (self-loop, invalid cost, unknown neighbor)
    #[error("Invalid neighbor: {0}")]
    InvalidNeighbor(#[from] RoutingError),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire encoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Channel error (mpsc/oneshot/broadcast)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,

    /// Node not started
    #[error("Node not started")]
    NotStarted,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for NodeError {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        NodeError::Channel(format!("Command send error: {}", e))
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for NodeError {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> Self {
        NodeError::Channel(format!("Reply dropped: {}", e))
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(e: toml::de::Error) -> Self {
        NodeError::Config(e.to_string())
    }
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;
