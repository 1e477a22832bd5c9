//! Link-state routing: LSDB + flooding + SPF

use std::collections::BTreeMap;

use linkstate_core::{Algorithm, LinkStatePacket, PeerIdentity, RoutingMessage};
use tracing::{debug, info, warn};

use crate::flooding::{FloodOutcome, FloodingEngine};
use crate::lsdb::LinkStateDatabase;
use crate::neighbors::NeighborSet;
use crate::protocol::{AgeTick, DatabaseEntry, Outbound, Reception, RoutingProtocol};
use crate::spf::ShortestPathEngine;
use crate::table::RoutingTable;

/// Link-state protocol state for one node
#[derive(Debug, Clone)]
pub struct LinkStateProtocol<I: PeerIdentity> {
    owner: I,
    sequence: u64,
    max_age: u32,
    lsdb: LinkStateDatabase<I>,
    flooding: FloodingEngine<I>,
}

impl<I: PeerIdentity> LinkStateProtocol<I> {
    /// Create state for `owner`; originated packets live `max_age` ticks
    pub fn new(owner: I, max_age: u32) -> Self {
        Self {
            lsdb: LinkStateDatabase::new(owner.clone()),
            flooding: FloodingEngine::new(),
            owner,
            sequence: 0,
            max_age,
        }
    }

    /// The node's database
    pub fn lsdb(&self) -> &LinkStateDatabase<I> {
        &self.lsdb
    }

    /// The node's flood state
    pub fn flooding(&self) -> &FloodingEngine<I> {
        &self.flooding
    }

    /// Declare a source unreachable and drop it
    pub fn purge(&mut self, source: &I) -> bool {
        if *source == self.owner {
            return false;
        }
        self.flooding.forget(source);
        self.lsdb.remove(source).is_some()
    }

    fn originate(&mut self, neighbors: &NeighborSet<I>) -> Vec<Outbound<I>> {
        let Some(next) = self.sequence.checked_add(1) else {
            warn!(owner = %self.owner, seq = self.sequence, "sequence space exhausted, not originating");
            return Vec::new();
        };
        self.sequence = next;
        let packet = LinkStatePacket::originate(
            self.owner.clone(),
            self.sequence,
            self.max_age,
            neighbors.as_map().clone(),
        );
        let message = RoutingMessage::Lsp(packet.clone());

        match self.flooding.originate(&mut self.lsdb, packet, neighbors) {
            FloodOutcome::Forward { targets } => {
                debug!(owner = %self.owner, seq = self.sequence, targets = targets.len(), "originated packet");
                Outbound::fan_out(targets, &message)
            }
            other => {
                warn!(owner = %self.owner, seq = self.sequence, outcome = ?other, "own packet not installed");
                Vec::new()
            }
        }
    }
}

impl<I: PeerIdentity> RoutingProtocol<I> for LinkStateProtocol<I> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::LinkState
    }

    fn on_local_change(&mut self, neighbors: &NeighborSet<I>) -> Vec<Outbound<I>> {
        self.originate(neighbors)
    }

    fn on_packet_received(
        &mut self,
        from: &I,
        message: RoutingMessage<I>,
        neighbors: &NeighborSet<I>,
    ) -> Reception<I> {
        let RoutingMessage::Lsp(packet) = message else {
            return Reception::Ignored;
        };

        // Own packets are never installed from the network. Anything other
        // than an echo of our current packet is left over from a previous
        // incarnation.
        if packet.source == self.owner {
            let echo = self.lsdb.get(&self.owner).is_some_and(|own| {
                own.sequence_number == packet.sequence_number && own.neighbors == packet.neighbors
            });
            if echo || packet.sequence_number < self.sequence {
                return Reception::Stale;
            }
            // No sequence number left above it to supersede with
            if packet.sequence_number == u64::MAX {
                warn!(owner = %self.owner, ours = self.sequence, "own packet seen with exhausted sequence, ignoring");
                return Reception::Stale;
            }
            info!(
                owner = %self.owner,
                seen = packet.sequence_number,
                ours = self.sequence,
                "own packet seen with newer sequence, re-originating"
            );
            self.sequence = packet.sequence_number;
            return Reception::Reissued {
                outbound: self.originate(neighbors),
            };
        }

        let message = RoutingMessage::Lsp(packet.clone());
        match self.flooding.receive(&mut self.lsdb, packet, from, neighbors) {
            FloodOutcome::Forward { targets } => Reception::Installed {
                outbound: Outbound::fan_out(targets, &message),
            },
            FloodOutcome::AlreadyFlooded => Reception::Installed {
                outbound: Vec::new(),
            },
            FloodOutcome::Stale => Reception::Stale,
            FloodOutcome::Corrupt(error) => Reception::Corrupt(error),
        }
    }

    fn on_age_tick(&mut self, elapsed_ticks: u32, _neighbors: &NeighborSet<I>) -> AgeTick<I> {
        let expired = self.lsdb.tick_age(elapsed_ticks);
        for source in &expired {
            self.flooding.forget(source);
            info!(owner = %self.owner, source = %source, "packet aged out");
        }
        AgeTick {
            expired,
            outbound: Vec::new(),
        }
    }

    fn compute_table(&self) -> RoutingTable<I> {
        ShortestPathEngine::compute(&self.lsdb.snapshot_graph(), &self.owner)
    }

    fn topology_version(&self) -> u64 {
        self.lsdb.version()
    }

    fn database_size(&self) -> usize {
        self.lsdb.len()
    }

    fn database_entries(&self) -> Vec<DatabaseEntry<I>> {
        self.lsdb
            .entries()
            .map(|packet| DatabaseEntry {
                source: packet.source.clone(),
                sequence_number: packet.sequence_number,
                age: packet.age,
                costs: packet.neighbors.clone(),
            })
            .collect()
    }

    fn sequence_number(&self) -> u64 {
        self.sequence
    }

    fn sequence_numbers(&self) -> BTreeMap<I, u64> {
        self.lsdb.sequence_numbers()
    }
}
