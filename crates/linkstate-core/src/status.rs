//! Read-only node introspection
//!
//! [`StatusSnapshot`] is what a node returns to `STATUS_REQUEST`. It is a
//! plain value: producing one never mutates node state.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::cost::LinkCost;
use crate::identity::PeerIdentity;

/// Routing algorithm hosted by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Flooded link-state advertisements + shortest-path first
    #[default]
    LinkState,
    /// Neighbor-scoped path-vector Bellman-Ford
    DistanceVector,
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LinkState => write!(f, "link-state"),
            Self::DistanceVector => write!(f, "distance-vector"),
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link-state" | "ls" | "lsr" => Ok(Self::LinkState),
            "distance-vector" | "dv" | "dvr" => Ok(Self::DistanceVector),
            other => Err(format!("unknown algorithm: {}", other)),
        }
    }
}

/// Protocol state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Own first advertisement not yet generated
    #[default]
    Initializing,
    /// Topology changed within the quiet period
    Converging,
    /// No topology change for a full quiet period (informational)
    Stable,
}

impl Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Converging => write!(f, "converging"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Point-in-time copy of a node's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Routing messages handed to the transport
    pub sent: u64,
    /// Routing messages received from neighbors
    pub received: u64,
    /// Received packets installed as newer
    pub packets_installed: u64,
    /// Duplicate or stale packets dropped (expected steady state)
    pub stale_rejected: u64,
    /// Packets dropped for reusing a sequence number with different content
    pub corrupt_rejected: u64,
    /// Frames that could not be decoded
    pub decode_errors: u64,
    /// Routing table recomputations
    pub tables_computed: u64,
    /// Reliable-mode retransmissions
    pub retransmissions: u64,
    /// Acknowledgments received
    pub acks_received: u64,
    /// Adjacencies marked down after retry exhaustion
    pub adjacency_demotions: u64,
    /// Transport-level send failures
    pub send_failures: u64,
}

/// Snapshot returned in `STATUS_RESPONSE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct StatusSnapshot<I: PeerIdentity> {
    /// Reporting node
    pub node: I,
    /// Hosted routing algorithm
    pub algorithm: Algorithm,
    /// Protocol state
    pub state: NodeState,
    /// Directly configured adjacencies
    pub neighbors: BTreeMap<I, LinkCost>,
    /// Sequence number of the node's latest own advertisement
    pub sequence_number: u64,
    /// Database version the current routing table was computed from
    pub topology_version: u64,
    /// Number of sources in the database
    pub lsdb_size: usize,
    /// Routing messages sent
    pub counters_sent: u64,
    /// Routing messages received
    pub counters_received: u64,
    /// Full counter set
    pub counters: CounterSnapshot,
}
