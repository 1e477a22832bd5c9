//! Error types for the simulation harness

use std::time::Duration;

use linkstate_node::NodeError;
use linkstate_routing::RoutingError;
use thiserror::Error;

/// Invalid topology definitions
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid node identifier: {0}")]
    InvalidIdentity(String),

    #[error("node {0} listed more than once")]
    DuplicateNode(String),

    #[error("link {a}-{b} defined more than once")]
    DuplicateLink { a: String, b: String },

    #[error("self-loop on node {0}")]
    SelfLoop(String),

    #[error("link endpoint {0} is not a declared node")]
    UnknownEndpoint(String),

    #[error("no link between {a} and {b}")]
    UnknownLink { a: String, b: String },

    #[error("invalid cost on link {a}-{b}: {reason}")]
    InvalidCost { a: String, b: String, reason: String },

    #[error("at most 26 single-letter nodes, got {0}")]
    TooManyNodes(usize),

    #[error("topology file parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot read topology file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from running a simulation
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("messages still in flight after {0} steps")]
    NotQuiet(usize),

    #[error("network did not converge within {0:?}")]
    Timeout(Duration),
}

pub type SimulationResult<T> = Result<T, SimulationError>;
