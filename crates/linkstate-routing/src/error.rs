//! Routing error types
//!
//! None of these terminate a node: they are reported to the caller, logged,
//! and counted.

use linkstate_core::{CostError, PacketError};
use thiserror::Error;

/// Errors raised by the routing layer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    /// Negative or non-finite cost at a neighbor mutation
    #[error("Invalid cost: {0}")]
    InvalidCost(#[from] CostError),

    /// A node configured as its own neighbor
    #[error("Self-loop: {0} cannot be its own neighbor")]
    SelfLoop(String),

    /// Re-costing a neighbor that is not configured
    #[error("Unknown neighbor: {0}")]
    UnknownNeighbor(String),

    /// Reliable delivery retry budget exhausted for this adjacency
    #[error("Neighbor unreachable: {0}")]
    NeighborUnreachable(String),

    /// Sequence number reused with different content
    #[error("Corrupt packet: {0}")]
    Corrupt(#[from] PacketError),
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
