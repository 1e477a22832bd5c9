//! Routing-protocol strategy interface
//!
//! The node runtime hosts any [`RoutingProtocol`] through the [`Protocol`]
//! enum. Protocols are synchronous state machines: they never perform I/O,
//! they return the [`Outbound`] messages the caller should send.

use std::collections::BTreeMap;

use linkstate_core::{Algorithm, LinkCost, PacketError, PeerIdentity, RoutingMessage};
use serde::{Deserialize, Serialize};

use crate::distance_vector::DistanceVectorProtocol;
use crate::link_state::LinkStateProtocol;
use crate::neighbors::NeighborSet;
use crate::table::RoutingTable;

/// A message addressed to one direct neighbor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound<I: PeerIdentity> {
    /// Receiving neighbor
    pub to: I,
    /// Payload
    pub message: RoutingMessage<I>,
}

impl<I: PeerIdentity> Outbound<I> {
    /// Address one message to several neighbors
    pub fn fan_out(targets: Vec<I>, message: &RoutingMessage<I>) -> Vec<Self> {
        targets
            .into_iter()
            .map(|to| Self {
                to,
                message: message.clone(),
            })
            .collect()
    }
}

/// What a received routing message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception<I: PeerIdentity> {
    /// Installed; the topology changed and these messages follow
    Installed { outbound: Vec<Outbound<I>> },
    /// Duplicate or stale; dropped
    Stale,
    /// Sequence number reused with different content; dropped
    Corrupt(PacketError),
    /// Our own advertisement came back newer than ours; we re-originated
    Reissued { outbound: Vec<Outbound<I>> },
    /// Not meaningful to this protocol
    Ignored,
}

impl<I: PeerIdentity> Reception<I> {
    /// Whether the topology view changed
    pub fn topology_changed(&self) -> bool {
        matches!(self, Self::Installed { .. } | Self::Reissued { .. })
    }

    /// Messages to send as a result
    pub fn outbound(&self) -> &[Outbound<I>] {
        match self {
            Self::Installed { outbound } | Self::Reissued { outbound } => outbound,
            _ => &[],
        }
    }
}

/// Result of an age tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeTick<I: PeerIdentity> {
    /// Sources whose state expired
    pub expired: Vec<I>,
    /// Messages to send as a result
    pub outbound: Vec<Outbound<I>>,
}

impl<I: PeerIdentity> AgeTick<I> {
    /// Whether anything expired
    pub fn topology_changed(&self) -> bool {
        !self.expired.is_empty()
    }
}

impl<I: PeerIdentity> Default for AgeTick<I> {
    fn default() -> Self {
        Self {
            expired: Vec::new(),
            outbound: Vec::new(),
        }
    }
}

/// One database row, for display and debugging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct DatabaseEntry<I: PeerIdentity> {
    /// Advertising node
    pub source: I,
    /// Latest accepted sequence number
    pub sequence_number: u64,
    /// Remaining lifetime in age ticks
    pub age: u32,
    /// Advertised costs (neighbors for link-state, destinations for distance-vector)
    pub costs: BTreeMap<I, LinkCost>,
}

/// Behavior every hosted routing algorithm provides
pub trait RoutingProtocol<I: PeerIdentity> {
    /// Which algorithm this is
    fn algorithm(&self) -> Algorithm;

    /// Originate a fresh self-advertisement after a neighbor change or refresh
    fn on_local_change(&mut self, neighbors: &NeighborSet<I>) -> Vec<Outbound<I>>;

    /// Handle a routing message from direct neighbor `from`
    fn on_packet_received(
        &mut self,
        from: &I,
        message: RoutingMessage<I>,
        neighbors: &NeighborSet<I>,
    ) -> Reception<I>;

    /// Advance ages by `elapsed_ticks`, expiring what ran out
    fn on_age_tick(&mut self, elapsed_ticks: u32, neighbors: &NeighborSet<I>) -> AgeTick<I>;

    /// Build a fresh routing table from current state
    fn compute_table(&self) -> RoutingTable<I>;

    /// Bumped on every change to the topology view
    fn topology_version(&self) -> u64;

    /// Number of sources held
    fn database_size(&self) -> usize;

    /// Current database rows in ascending source order
    fn database_entries(&self) -> Vec<DatabaseEntry<I>>;

    /// Sequence number of our latest self-advertisement
    fn sequence_number(&self) -> u64;

    /// source -> latest sequence number held
    fn sequence_numbers(&self) -> BTreeMap<I, u64>;
}

/// The routing algorithm a node hosts
#[derive(Debug, Clone)]
pub enum Protocol<I: PeerIdentity> {
    /// Flooded link-state + SPF
    LinkState(LinkStateProtocol<I>),
    /// Path-vector Bellman-Ford
    DistanceVector(DistanceVectorProtocol<I>),
}

impl<I: PeerIdentity> Protocol<I> {
    /// Create the protocol for `algorithm`
    pub fn new(algorithm: Algorithm, owner: I, max_age: u32) -> Self {
        match algorithm {
            Algorithm::LinkState => Self::LinkState(LinkStateProtocol::new(owner, max_age)),
            Algorithm::DistanceVector => {
                Self::DistanceVector(DistanceVectorProtocol::new(owner, max_age))
            }
        }
    }

    fn inner(&self) -> &dyn RoutingProtocol<I> {
        match self {
            Self::LinkState(protocol) => protocol,
            Self::DistanceVector(protocol) => protocol,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RoutingProtocol<I> {
        match self {
            Self::LinkState(protocol) => protocol,
            Self::DistanceVector(protocol) => protocol,
        }
    }
}

impl<I: PeerIdentity> RoutingProtocol<I> for Protocol<I> {
    fn algorithm(&self) -> Algorithm {
        self.inner().algorithm()
    }

    fn on_local_change(&mut self, neighbors: &NeighborSet<I>) -> Vec<Outbound<I>> {
        self.inner_mut().on_local_change(neighbors)
    }

    fn on_packet_received(
        &mut self,
        from: &I,
        message: RoutingMessage<I>,
        neighbors: &NeighborSet<I>,
    ) -> Reception<I> {
        self.inner_mut().on_packet_received(from, message, neighbors)
    }

    fn on_age_tick(&mut self, elapsed_ticks: u32, neighbors: &NeighborSet<I>) -> AgeTick<I> {
        self.inner_mut().on_age_tick(elapsed_ticks, neighbors)
    }

    fn compute_table(&self) -> RoutingTable<I> {
        self.inner().compute_table()
    }

    fn topology_version(&self) -> u64 {
        self.inner().topology_version()
    }

    fn database_size(&self) -> usize {
        self.inner().database_size()
    }

    fn database_entries(&self) -> Vec<DatabaseEntry<I>> {
        self.inner().database_entries()
    }

    fn sequence_number(&self) -> u64 {
        self.inner().sequence_number()
    }

    fn sequence_numbers(&self) -> BTreeMap<I, u64> {
        self.inner().sequence_numbers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstate_core::SimulationIdentity;

    fn make_id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    #[test]
    fn test_protocol_reports_algorithm() {
        let ls = Protocol::new(Algorithm::LinkState, make_id('A'), 10);
        let dv = Protocol::new(Algorithm::DistanceVector, make_id('A'), 10);
        assert_eq!(ls.algorithm(), Algorithm::LinkState);
        assert_eq!(dv.algorithm(), Algorithm::DistanceVector);
        assert_eq!(ls.sequence_number(), 0);
        assert!(ls.compute_table().is_empty());
    }

    #[test]
    fn test_hosts_either_algorithm_interchangeably() {
        let neighbors = NeighborSet::with_neighbors(
            make_id('A'),
            [(make_id('B'), LinkCost::new(7.0).unwrap())],
        )
        .unwrap();

        for algorithm in [Algorithm::LinkState, Algorithm::DistanceVector] {
            let mut protocol = Protocol::new(algorithm, make_id('A'), 10);
            let outbound = protocol.on_local_change(&neighbors);
            assert_eq!(outbound.len(), 1, "{algorithm}");
            assert_eq!(outbound[0].to, make_id('B'));
            assert_eq!(protocol.sequence_number(), 1);
        }
    }
}
