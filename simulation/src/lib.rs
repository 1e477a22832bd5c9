//! # Linkstate Simulation
//!
//! Harnesses for exercising the routing engine on whole networks.
//!
//! ## Overview
//!
//! - **Topology** (`topology.rs`): Nodes and weighted links, generators, TOML files
//! - **Lockstep** (`lockstep.rs`): Deterministic single-thread simulation over node cores
//! - **Network** (`network.rs`): Real async nodes over in-memory transports
//! - **Scenarios** (`scenarios.rs`): The reference network's convergence and failure runs
//!
//! ## Example: Link Failure
//!
//! ```rust,ignore
//! use linkstate_simulation::{LockstepSimulation, topology};
//! use linkstate_node::ProtocolConfig;
//!
//! let mut sim = LockstepSimulation::new(topology::sample()?, ProtocolConfig::fast())?;
//! sim.initialize();
//! sim.run_until_quiet(10_000)?;
//!
//! sim.fail_link(&f, &h)?;
//! sim.run_until_quiet(10_000)?;
//! assert!(sim.routing_table(&h).unwrap().is_empty());
//! ```
//!
//! ## Reference Network
//!
//! Nine nodes, A through I. Links: A-B 7, A-I 1, A-C 7, B-F 2, I-D 6, C-D 5, D-F 1, D-E 1, F-G 3,
//! F-H 4, G-E 4.

pub mod error;
pub mod lockstep;
pub mod network;
pub mod scenarios;
pub mod topology;

pub use error::{SimulationError, SimulationResult, TopologyError};
pub use lockstep::{LockstepSimulation, LockstepStats};
pub use network::{SimulatedNetwork, SimulatedNode};
pub use scenarios::{Phase, ScenarioName, ScenarioReport};
pub use topology::{Link, Topology, from_edges};

// Re-export core types for integration
pub use linkstate_core::SimulationIdentity;
