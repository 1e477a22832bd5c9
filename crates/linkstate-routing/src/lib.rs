//! # Linkstate Routing
//!
//! Routing engines for the link-state routing simulator.
//!
//! Everything here is synchronous and single-owner: a node's runtime owns
//! one [`Protocol`] and feeds it neighbor changes, received messages, and
//! age ticks. Nothing is shared between nodes except the messages the
//! engines return.
//!
//! ## Core Components
//!
//! - [`NeighborSet`]: A node's configured adjacencies; the only trigger for out-of-cycle origination
//! - [`LinkStateDatabase`]: Latest packet per source, with freshness checks and aging
//! - [`ShortestPathEngine`]: Deterministic Dijkstra over a database snapshot
//! - [`FloodingEngine`]: At-most-once flooding with a per-source seen-set
//! - [`ReliableDelivery`]: ACK tracking, retransmission, and adjacency demotion
//! - [`RoutingProtocol`] / [`Protocol`]: Strategy interface hosting link-state or distance-vector
//!
//! ## Example
//!
//! ```rust,ignore
//! use linkstate_routing::{NeighborChange, NeighborSet, Protocol, RoutingProtocol};
//! use linkstate_core::{Algorithm, SimulationIdentity};
//!
//! let a = SimulationIdentity::new('A').unwrap();
//! let mut neighbors = NeighborSet::new(a);
//! neighbors.apply(NeighborChange::add(SimulationIdentity::new('B').unwrap(), 7.0)?)?;
//!
//! let mut protocol = Protocol::new(Algorithm::LinkState, a, 60);
//! for outbound in protocol.on_local_change(&neighbors) {
//!     // hand outbound.message to the transport for outbound.to
//! }
//! let table = protocol.compute_table();
//! ```

pub mod distance_vector;
pub mod error;
pub mod flooding;
pub mod link_state;
pub mod lsdb;
pub mod neighbors;
pub mod protocol;
pub mod reliable;
pub mod spf;
pub mod table;

// Re-export main types
pub use distance_vector::DistanceVectorProtocol;
pub use error::{RoutingError, RoutingResult};
pub use flooding::{FloodOutcome, FloodingEngine};
pub use link_state::LinkStateProtocol;
pub use lsdb::{AcceptOutcome, LinkStateDatabase, RejectReason, TopologySnapshot};
pub use neighbors::{NeighborChange, NeighborSet};
pub use protocol::{AgeTick, DatabaseEntry, Outbound, Protocol, Reception, RoutingProtocol};
pub use reliable::{PendingDelivery, PollOutcome, ReliableDelivery};
pub use spf::ShortestPathEngine;
pub use table::{Route, RoutingTable, TableDiff};
