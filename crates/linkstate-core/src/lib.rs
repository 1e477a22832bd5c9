//! # Linkstate Core
//!
//! Value types, wire messages, and transport abstractions shared by every
//! crate of the link-state routing simulator.
//!
//! ## Key Traits
//!
//! - [`PeerIdentity`]: Node identifier (char for simulation, string for named nodes)
//! - [`Transport`]: Best-effort frame delivery between direct neighbors
//!
//! ## Key Types
//!
//! - [`LinkCost`]: Validated non-negative finite link metric
//! - [`LinkStatePacket`]: One node's advertised adjacency, keyed by sequence number
//! - [`WireMessage`] / [`WireCodec`]: Tagged JSON frames exchanged between nodes
//! - [`StatusSnapshot`]: Read-only introspection of a running node
//! - [`MockTransport`] / [`MockNetwork`]: In-memory transport with link failure injection

pub mod cost;
pub mod error;
pub mod identity;
pub mod message;
pub mod mock_transport;
pub mod packet;
pub mod status;
pub mod transport;

// Re-export main types
pub use cost::*;
pub use error::*;
pub use identity::*;
pub use message::*;
pub use mock_transport::*;
pub use packet::*;
pub use status::*;
pub use transport::*;
