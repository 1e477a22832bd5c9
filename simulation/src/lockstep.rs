//! Deterministic lockstep simulation
//!
//! Runs one [`NodeCore`] per topology node on the calling thread. Messages
//! travel through a single FIFO queue and are delivered one per
//! [`step`](LockstepSimulation::step), so a run is fully reproducible. Time
//! is virtual and only moves when the simulation is told to advance it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use linkstate_core::{Algorithm, LspKey, PeerIdentity, WireMessage};
use linkstate_logging::{NodeContextGuard, node_span};
use linkstate_node::{Envelope, NodeCore, ProtocolConfig};
use linkstate_routing::{NeighborChange, NeighborSet, RoutingProtocol, RoutingTable};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SimulationError, SimulationResult};
use crate::topology::Topology;

/// All nodes of a topology, stepped one message at a time
pub struct LockstepSimulation<I: PeerIdentity> {
    config: ProtocolConfig,
    /// Links currently up
    topology: Topology<I>,
    nodes: BTreeMap<I, NodeCore<I>>,
    /// (sender, envelope) in send order
    in_flight: VecDeque<(I, Envelope<I>)>,
    origin: Instant,
    elapsed: Duration,
    run_id: Uuid,
    /// (forwarding node, update, neighbor) -> times sent
    forwards: BTreeMap<(I, LspKey<I>, I), u32>,
    stats: LockstepStats,
}

/// Message counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockstepStats {
    /// Messages handed to a node
    pub delivered: u64,
    /// Messages lost on a link that went down
    pub dropped: u64,
    /// Steps taken
    pub steps: u64,
}

impl<I: PeerIdentity> LockstepSimulation<I> {
    /// Build a core per node; nothing is advertised until [`initialize`](Self::initialize)
    pub fn new(topology: Topology<I>, config: ProtocolConfig) -> SimulationResult<Self> {
        config.validate()?;
        let origin = Instant::now();

        let mut nodes = BTreeMap::new();
        for id in topology.nodes() {
            let mut neighbors = NeighborSet::new(id.clone());
            for (neighbor, cost) in topology.neighbor_config(&id) {
                neighbors.apply(NeighborChange::add(neighbor, cost)?)?;
            }
            nodes.insert(id, NodeCore::new(neighbors, &config, origin));
        }

        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, nodes = nodes.len(), algorithm = %config.algorithm, "lockstep simulation created");

        Ok(Self {
            config,
            topology,
            nodes,
            in_flight: VecDeque::new(),
            origin,
            elapsed: Duration::ZERO,
            run_id,
            forwards: BTreeMap::new(),
            stats: LockstepStats::default(),
        })
    }

    /// Current virtual time
    pub fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    /// Virtual time since creation
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Move virtual time forward without firing timers
    pub fn advance(&mut self, by: Duration) {
        self.elapsed += by;
    }

    /// Every node originates its first advertisement
    pub fn initialize(&mut self) {
        self.for_each_node(|core, now| core.initialize(now));
    }

    /// Every node refreshes its advertisement
    pub fn refresh_all(&mut self) {
        self.for_each_node(|core, now| core.refresh(now));
    }

    /// Advance one age tick interval and age every node by one tick
    pub fn age_tick_all(&mut self) {
        self.advance(self.config.age_tick_interval());
        self.for_each_node(|core, now| core.age_tick(1, now));
    }

    /// Poll every node's acknowledgment tracker
    pub fn retransmit_all(&mut self) {
        self.for_each_node(|core, now| core.poll_retransmissions(now));
    }

    fn for_each_node(&mut self, mut action: impl FnMut(&mut NodeCore<I>, Instant) -> Vec<Envelope<I>>) {
        let now = self.now();
        let ids: Vec<I> = self.nodes.keys().cloned().collect();
        for id in ids {
            let envelopes = match self.nodes.get_mut(&id) {
                Some(core) => {
                    let _context = NodeContextGuard::new(&id, self.run_id);
                    let _span = node_span(&id, self.run_id).entered();
                    action(core, now)
                }
                None => continue,
            };
            self.enqueue(&id, envelopes);
        }
    }

    fn enqueue(&mut self, from: &I, envelopes: Vec<Envelope<I>>) {
        for envelope in envelopes {
            if let WireMessage::LspFlood { packet, .. } = &envelope.message {
                *self
                    .forwards
                    .entry((from.clone(), packet.key(), envelope.to.clone()))
                    .or_default() += 1;
            }
            self.in_flight.push_back((from.clone(), envelope));
        }
    }

    /// Deliver the oldest in-flight message
    ///
    /// Returns false when nothing is in flight. A message whose link is no
    /// longer up is dropped.
    pub fn step(&mut self) -> bool {
        let Some((from, envelope)) = self.in_flight.pop_front() else {
            return false;
        };
        self.stats.steps += 1;

        let to = envelope.to;
        if !self.topology.are_connected(&from, &to) {
            self.stats.dropped += 1;
            debug!(from = %from, to = %to, kind = envelope.message.kind(), "link down, message lost");
            return true;
        }

        let now = self.now();
        let envelopes = match self.nodes.get_mut(&to) {
            Some(core) => {
                let _context = NodeContextGuard::new(&to, self.run_id);
                let _span = node_span(&to, self.run_id).entered();
                core.handle_message(&from, envelope.message, now)
            }
            None => {
                self.stats.dropped += 1;
                return true;
            }
        };
        self.stats.delivered += 1;
        self.enqueue(&to, envelopes);
        true
    }

    /// Step until nothing is in flight
    ///
    /// Returns the number of steps taken, or [`SimulationError::NotQuiet`]
    /// if messages remain after `max_steps`.
    pub fn run_until_quiet(&mut self, max_steps: usize) -> SimulationResult<usize> {
        for taken in 0..max_steps {
            if !self.step() {
                return Ok(taken);
            }
        }
        if self.in_flight.is_empty() {
            Ok(max_steps)
        } else {
            Err(SimulationError::NotQuiet(max_steps))
        }
    }

    /// Take the link `a`-`b` down; both ends drop the adjacency
    pub fn fail_link(&mut self, a: &I, b: &I) -> SimulationResult<()> {
        self.topology = self.topology.without_link(a, b)?;
        info!(a = %a, b = %b, "link failed");
        self.change_neighbor(a, NeighborChange::remove(b.clone()))?;
        self.change_neighbor(b, NeighborChange::remove(a.clone()))?;
        Ok(())
    }

    /// Bring the link `a`-`b` up with `cost`
    pub fn restore_link(&mut self, a: &I, b: &I, cost: f64) -> SimulationResult<()> {
        self.topology = self.topology.with_link(a.clone(), b.clone(), cost)?;
        info!(a = %a, b = %b, cost, "link restored");
        self.change_neighbor(a, NeighborChange::add(b.clone(), cost)?)?;
        self.change_neighbor(b, NeighborChange::add(a.clone(), cost)?)?;
        Ok(())
    }

    /// Apply an operator neighbor change at one node
    pub fn change_neighbor(&mut self, node: &I, change: NeighborChange<I>) -> SimulationResult<()> {
        let now = self.now();
        let core = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| SimulationError::UnknownNode(node.to_string()))?;
        let envelopes = {
            let _context = NodeContextGuard::new(node, self.run_id);
            let _span = node_span(node, self.run_id).entered();
            core.change_neighbor(change, now)?
        };
        self.enqueue(node, envelopes);
        Ok(())
    }

    /// Nothing in flight, and for link-state every node agrees on the latest
    /// sequence number of every source with the nodes it can reach
    pub fn is_converged(&self) -> bool {
        if !self.in_flight.is_empty() {
            return false;
        }
        if self.config.algorithm != Algorithm::LinkState {
            return true;
        }

        self.topology.components().iter().all(|component| {
            let mut maps = component
                .iter()
                .filter_map(|id| self.nodes.get(id))
                .map(|core| core.protocol().sequence_numbers());
            match maps.next() {
                Some(first) => maps.all(|map| map == first),
                None => true,
            }
        })
    }

    pub fn node(&self, id: &I) -> Option<&NodeCore<I>> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&I, &NodeCore<I>)> {
        self.nodes.iter()
    }

    /// Current routing table of `id`
    pub fn routing_table(&self, id: &I) -> Option<Arc<RoutingTable<I>>> {
        self.nodes.get(id).map(|core| core.routing_table())
    }

    /// Every node's current routing table
    pub fn tables(&self) -> BTreeMap<I, Arc<RoutingTable<I>>> {
        self.nodes
            .iter()
            .map(|(id, core)| (id.clone(), core.routing_table()))
            .collect()
    }

    /// Links currently up
    pub fn topology(&self) -> &Topology<I> {
        &self.topology
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> LockstepStats {
        self.stats
    }

    /// Times `node` sent update `key` to `neighbor`
    pub fn forward_count(&self, node: &I, key: &LspKey<I>, neighbor: &I) -> u32 {
        self.forwards
            .get(&(node.clone(), key.clone(), neighbor.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Largest number of times any node sent any update to any one neighbor
    pub fn max_forward_count(&self) -> u32 {
        self.forwards.values().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{self, SAMPLE_LINKS};
    use linkstate_core::{NodeState, SimulationIdentity};

    fn id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn path(s: &str) -> Vec<SimulationIdentity> {
        s.chars().map(id).collect()
    }

    fn converged_sample(config: ProtocolConfig) -> LockstepSimulation<SimulationIdentity> {
        let mut sim = LockstepSimulation::new(topology::sample().unwrap(), config).unwrap();
        sim.initialize();
        sim.run_until_quiet(10_000).unwrap();
        sim
    }

    #[test]
    fn test_sample_network_converges() {
        let sim = converged_sample(ProtocolConfig::fast());
        assert!(sim.is_converged());

        let h = sim.routing_table(&id('H')).unwrap();
        let to_a = h.get(&id('A')).unwrap();
        assert_eq!(to_a.total_cost.value(), 12.0);
        assert_eq!(to_a.path, path("HFDIA"));
        assert_eq!(to_a.next_hop, id('F'));

        let a = sim.routing_table(&id('A')).unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(a.get(&id('D')).unwrap().path, path("AID"));
        assert_eq!(a.get(&id('E')).unwrap().total_cost.value(), 8.0);

        for (_, core) in sim.nodes() {
            assert_eq!(core.database().len(), 9);
        }
    }

    #[test]
    fn test_each_update_forwarded_at_most_once_per_neighbor() {
        let sim = converged_sample(ProtocolConfig::fast());
        assert_eq!(sim.max_forward_count(), 1);

        // A's first advertisement reaches each of its neighbors from A exactly once
        let key = LspKey::new(id('A'), 1);
        for neighbor in ['B', 'C', 'I'] {
            assert_eq!(sim.forward_count(&id('A'), &key, &id(neighbor)), 1);
        }
        assert_eq!(sim.forward_count(&id('A'), &key, &id('D')), 0);
    }

    #[test]
    fn test_not_converged_while_messages_in_flight() {
        let mut sim = LockstepSimulation::new(topology::sample().unwrap(), ProtocolConfig::fast()).unwrap();
        sim.initialize();
        assert!(sim.in_flight() > 0);
        assert!(!sim.is_converged());

        assert!(matches!(sim.run_until_quiet(3), Err(SimulationError::NotQuiet(3))));
    }

    #[test]
    fn test_link_failure_and_recovery() {
        let mut sim = converged_sample(ProtocolConfig::fast());

        sim.fail_link(&id('F'), &id('H')).unwrap();
        sim.run_until_quiet(10_000).unwrap();
        assert!(sim.is_converged());

        assert!(sim.routing_table(&id('H')).unwrap().is_empty());
        for (node, table) in sim.tables() {
            if node != id('H') {
                assert!(table.get(&id('H')).is_none(), "{} still routes to H", node);
            }
        }

        sim.restore_link(&id('F'), &id('H'), 6.0).unwrap();
        sim.run_until_quiet(10_000).unwrap();
        assert!(sim.is_converged());

        let h = sim.routing_table(&id('H')).unwrap();
        let to_a = h.get(&id('A')).unwrap();
        assert_eq!(to_a.total_cost.value(), 14.0);
        assert_eq!(to_a.path, path("HFDIA"));

        let a = sim.routing_table(&id('A')).unwrap();
        assert_eq!(a.get(&id('H')).unwrap().path, path("AIDFH"));
    }

    #[test]
    fn test_messages_on_failed_link_are_lost() {
        let mut sim = LockstepSimulation::new(topology::sample().unwrap(), ProtocolConfig::fast()).unwrap();
        sim.initialize();
        sim.fail_link(&id('A'), &id('B')).unwrap();
        sim.run_until_quiet(10_000).unwrap();

        assert!(sim.stats().dropped > 0);
        assert!(sim.is_converged());
        let b = sim.routing_table(&id('B')).unwrap();
        assert_eq!(b.get(&id('A')).unwrap().path, path("BFDIA"));
    }

    #[test]
    fn test_unreachable_entries_age_out() {
        let mut sim = converged_sample(ProtocolConfig::fast());
        sim.fail_link(&id('F'), &id('H')).unwrap();
        sim.run_until_quiet(10_000).unwrap();
        assert!(sim.node(&id('A')).unwrap().protocol().sequence_numbers().contains_key(&id('H')));

        // Refresh every 20 ticks keeps the connected part alive
        for tick in 1..=45 {
            sim.age_tick_all();
            if tick % 20 == 0 {
                sim.refresh_all();
            }
            sim.run_until_quiet(10_000).unwrap();
        }

        let a = sim.node(&id('A')).unwrap();
        assert!(!a.protocol().sequence_numbers().contains_key(&id('H')));
        assert_eq!(a.database().len(), 8);
        assert_eq!(a.routing_table().len(), 7);
    }

    #[test]
    fn test_nodes_settle_after_quiet_period() {
        let mut sim = converged_sample(ProtocolConfig::fast());
        assert!(sim.nodes().all(|(_, core)| core.state() == NodeState::Converging));

        // fast(): 50ms ticks, 200ms quiet period
        for _ in 0..4 {
            sim.age_tick_all();
        }
        assert_eq!(sim.in_flight(), 0);
        assert!(sim.nodes().all(|(_, core)| core.state() == NodeState::Stable));

        sim.fail_link(&id('F'), &id('H')).unwrap();
        assert_eq!(sim.node(&id('F')).unwrap().state(), NodeState::Converging);
    }

    #[test]
    fn test_distance_vector_matches_link_state_costs() {
        let config = ProtocolConfig::fast().with_algorithm(Algorithm::DistanceVector);
        let dv = converged_sample(config);
        let ls = converged_sample(ProtocolConfig::fast());

        for (node, table) in dv.tables() {
            let reference = ls.routing_table(&node).unwrap();
            assert_eq!(table.len(), reference.len(), "route count at {}", node);
            for route in table.routes() {
                let expected = reference.get(&route.destination).unwrap();
                assert_eq!(route.total_cost, expected.total_cost, "{} -> {}", node, route.destination);
            }
        }
    }

    #[test]
    fn test_unknown_node_and_link_errors() {
        let mut sim = LockstepSimulation::new(topology::sample().unwrap(), ProtocolConfig::fast()).unwrap();
        assert!(matches!(
            sim.change_neighbor(&id('Z'), NeighborChange::remove(id('A'))),
            Err(SimulationError::UnknownNode(_))
        ));
        assert!(matches!(
            sim.fail_link(&id('A'), &id('H')),
            Err(SimulationError::Topology(_))
        ));
        assert_eq!(SAMPLE_LINKS.len(), sim.topology().link_count());
    }
}
