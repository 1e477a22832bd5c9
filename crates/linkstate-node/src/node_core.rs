//! Single-writer protocol state for one node
//!
//! [`NodeCore`] owns everything a node mutates: its neighbor set, the hosted
//! routing protocol, counters and the current routing table. It never
//! performs I/O. Every entry point takes the current instant and returns the
//! [`Envelope`]s the caller should deliver, so the same core runs under the
//! async [`Node`](crate::Node) driver and under a lockstep simulator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use linkstate_core::{
    CounterSnapshot, LspKey, NodeState, PeerIdentity, RoutingMessage, StatusSnapshot, WireCodec,
    WireMessage,
};
use linkstate_routing::{
    DatabaseEntry, NeighborChange, NeighborSet, Outbound, Protocol, Reception, ReliableDelivery,
    RoutingProtocol, RoutingTable,
};
use tracing::{debug, info, warn};

use crate::config::{DeliveryMode, ProtocolConfig};
use crate::error::NodeResult;

/// A wire message addressed to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<I: PeerIdentity> {
    /// Receiving peer
    pub to: I,
    /// Payload
    pub message: WireMessage<I>,
}

/// Protocol state machine for one node
pub struct NodeCore<I: PeerIdentity> {
    identity: I,
    neighbors: NeighborSet<I>,
    protocol: Protocol<I>,
    state: NodeState,
    counters: CounterSnapshot,
    table: Arc<RoutingTable<I>>,
    /// Topology version the current table reflects
    table_version: u64,
    last_change: Instant,
    quiet_period: Duration,
    reliable: Option<ReliableDelivery<I>>,
}

impl<I: PeerIdentity> NodeCore<I> {
    /// Create a core; nothing is advertised until [`initialize`](Self::initialize)
    pub fn new(neighbors: NeighborSet<I>, config: &ProtocolConfig, now: Instant) -> Self {
        let identity = neighbors.owner().clone();
        let reliable = match config.delivery {
            DeliveryMode::Reliable {
                ack_timeout_ms,
                retry_budget,
            } => Some(ReliableDelivery::new(
                Duration::from_millis(ack_timeout_ms),
                retry_budget,
            )),
            DeliveryMode::BestEffort => None,
        };

        Self {
            protocol: Protocol::new(config.algorithm, identity.clone(), config.max_age_ticks),
            table: Arc::new(RoutingTable::empty(identity.clone())),
            table_version: 0,
            identity,
            neighbors,
            state: NodeState::Initializing,
            counters: CounterSnapshot::default(),
            last_change: now,
            quiet_period: config.quiet_period(),
            reliable,
        }
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn neighbors(&self) -> &NeighborSet<I> {
        &self.neighbors
    }

    pub fn protocol(&self) -> &Protocol<I> {
        &self.protocol
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters
    }

    /// Current routing table
    pub fn routing_table(&self) -> Arc<RoutingTable<I>> {
        Arc::clone(&self.table)
    }

    /// Current database rows
    pub fn database(&self) -> Vec<DatabaseEntry<I>> {
        self.protocol.database_entries()
    }

    /// Unacknowledged sends (reliable mode only)
    pub fn pending_acks(&self) -> usize {
        self.reliable.as_ref().map_or(0, |r| r.pending_count())
    }

    /// Generate and flood the first self-advertisement
    ///
    /// Calling it again after initialization behaves like a refresh.
    pub fn initialize(&mut self, now: Instant) -> Vec<Envelope<I>> {
        let outbound = self.protocol.on_local_change(&self.neighbors);
        if self.state == NodeState::Initializing {
            info!(
                node = %self.identity,
                algorithm = %self.protocol.algorithm(),
                neighbors = self.neighbors.len(),
                "node initialized"
            );
            self.state = NodeState::Converging;
        }
        self.recompute_if_changed(now);
        self.route(outbound, now)
    }

    /// Periodic refresh: same neighbors, next sequence number
    pub fn refresh(&mut self, now: Instant) -> Vec<Envelope<I>> {
        debug!(node = %self.identity, seq = self.protocol.sequence_number() + 1, "refreshing");
        let outbound = self.protocol.on_local_change(&self.neighbors);
        self.recompute_if_changed(now);
        self.route(outbound, now)
    }

    /// Apply an operator change to the neighbor set
    ///
    /// A change that alters nothing does not regenerate the advertisement.
    pub fn change_neighbor(
        &mut self,
        change: NeighborChange<I>,
        now: Instant,
    ) -> NodeResult<Vec<Envelope<I>>> {
        let removed = matches!(change, NeighborChange::Remove { .. }).then(|| change.neighbor().clone());
        if !self.neighbors.apply(change)? {
            return Ok(Vec::new());
        }
        if let (Some(neighbor), Some(reliable)) = (removed, &self.reliable) {
            reliable.forget_neighbor(&neighbor);
        }

        info!(node = %self.identity, neighbors = ?self.neighbors.ids(), "neighbor set changed");
        let outbound = self.protocol.on_local_change(&self.neighbors);
        self.recompute_if_changed(now);
        Ok(self.route(outbound, now))
    }

    /// Advance ages by `elapsed_ticks`
    pub fn age_tick(&mut self, elapsed_ticks: u32, now: Instant) -> Vec<Envelope<I>> {
        let tick = self.protocol.on_age_tick(elapsed_ticks, &self.neighbors);
        if tick.topology_changed() {
            info!(node = %self.identity, expired = ?tick.expired, "entries aged out");
        }
        self.recompute_if_changed(now);
        self.settle(now);
        self.route(tick.outbound, now)
    }

    /// Decode and handle one frame from `from`
    ///
    /// Undecodable frames are dropped and counted.
    pub fn handle_frame(&mut self, from: &I, frame: &[u8], now: Instant) -> Vec<Envelope<I>> {
        match WireCodec::decode(frame) {
            Ok(message) => self.handle_message(from, message, now),
            Err(e) => {
                self.counters.decode_errors += 1;
                warn!(node = %self.identity, from = %from, error = %e, "dropping undecodable frame");
                Vec::new()
            }
        }
    }

    /// Handle one decoded message from `from`
    pub fn handle_message(&mut self, from: &I, message: WireMessage<I>, now: Instant) -> Vec<Envelope<I>> {
        match message {
            WireMessage::LspFlood { .. } | WireMessage::DistanceVector { .. } => {
                let Some((sender, routing)) = message.into_routing() else {
                    return Vec::new();
                };
                if sender != *from {
                    debug!(node = %self.identity, from = %from, sender = %sender, "sender field differs from transport peer");
                }
                self.handle_routing(from, routing, now)
            }
            WireMessage::Ack {
                source,
                sequence_number,
                ..
            } => {
                self.counters.acks_received += 1;
                let key = LspKey::new(source, sequence_number);
                if let Some(reliable) = &self.reliable {
                    reliable.acknowledge(from, &key);
                }
                Vec::new()
            }
            WireMessage::Hello { .. } => vec![Envelope {
                to: from.clone(),
                message: WireMessage::HelloResponse {
                    from: self.identity.clone(),
                    timestamp: Utc::now(),
                },
            }],
            WireMessage::StatusRequest { .. } => vec![Envelope {
                to: from.clone(),
                message: WireMessage::StatusResponse {
                    status: self.status(),
                },
            }],
            WireMessage::HelloResponse { .. } | WireMessage::StatusResponse { .. } => {
                debug!(node = %self.identity, from = %from, "ignoring monitoring reply");
                Vec::new()
            }
        }
    }

    /// Handle one routing message from direct neighbor `from`
    pub fn handle_routing(&mut self, from: &I, message: RoutingMessage<I>, now: Instant) -> Vec<Envelope<I>> {
        self.counters.received += 1;
        let key = message.key();

        let mut envelopes = Vec::new();
        if self.reliable.is_some() {
            envelopes.push(Envelope {
                to: from.clone(),
                message: WireMessage::ack(&key, self.identity.clone()),
            });
        }

        let reception = self.protocol.on_packet_received(from, message, &self.neighbors);
        let outbound = match reception {
            Reception::Installed { outbound } => {
                self.counters.packets_installed += 1;
                debug!(node = %self.identity, from = %from, key = %key, forwards = outbound.len(), "installed");
                outbound
            }
            Reception::Reissued { outbound } => outbound,
            Reception::Stale => {
                self.counters.stale_rejected += 1;
                debug!(node = %self.identity, from = %from, key = %key, "duplicate or stale");
                Vec::new()
            }
            Reception::Corrupt(error) => {
                self.counters.corrupt_rejected += 1;
                warn!(node = %self.identity, from = %from, error = %error, "corrupt packet dropped");
                Vec::new()
            }
            Reception::Ignored => {
                debug!(node = %self.identity, from = %from, key = %key, "message not used by this algorithm");
                Vec::new()
            }
        };

        self.recompute_if_changed(now);
        envelopes.extend(self.route(outbound, now));
        envelopes
    }

    /// Retransmit overdue sends and demote neighbors out of retries
    pub fn poll_retransmissions(&mut self, now: Instant) -> Vec<Envelope<I>> {
        let Some(reliable) = &self.reliable else {
            return Vec::new();
        };
        let outcome = reliable.poll(now);

        let mut envelopes: Vec<Envelope<I>> = outcome
            .retransmit
            .into_iter()
            .map(|(to, message)| Envelope {
                to,
                message: message.into_wire(self.identity.clone()),
            })
            .collect();
        self.counters.retransmissions += envelopes.len() as u64;
        self.counters.sent += envelopes.len() as u64;

        let mut demoted = false;
        for neighbor in outcome.unreachable {
            if let Ok(true) = self.neighbors.apply(NeighborChange::remove(neighbor.clone())) {
                self.counters.adjacency_demotions += 1;
                demoted = true;
                warn!(node = %self.identity, neighbor = %neighbor, "neighbor unreachable, adjacency demoted");
            }
        }
        if demoted {
            let outbound = self.protocol.on_local_change(&self.neighbors);
            self.recompute_if_changed(now);
            envelopes.extend(self.route(outbound, now));
        }
        envelopes
    }

    /// Record a frame the transport could not deliver
    pub fn record_send_failure(&mut self, to: &I) {
        self.counters.send_failures += 1;
        debug!(node = %self.identity, to = %to, "send failed");
    }

    /// Move to Stable once the quiet period has passed without change
    ///
    /// Returns whether the state changed.
    pub fn settle(&mut self, now: Instant) -> bool {
        if self.state == NodeState::Converging
            && now.saturating_duration_since(self.last_change) >= self.quiet_period
        {
            self.state = NodeState::Stable;
            info!(
                node = %self.identity,
                version = self.table_version,
                routes = self.table.len(),
                "stable"
            );
            return true;
        }
        false
    }

    /// Read-only snapshot for `STATUS_RESPONSE`
    pub fn status(&self) -> StatusSnapshot<I> {
        StatusSnapshot {
            node: self.identity.clone(),
            algorithm: self.protocol.algorithm(),
            state: self.state,
            neighbors: self.neighbors.as_map().clone(),
            sequence_number: self.protocol.sequence_number(),
            topology_version: self.protocol.topology_version(),
            lsdb_size: self.protocol.database_size(),
            counters_sent: self.counters.sent,
            counters_received: self.counters.received,
            counters: self.counters,
        }
    }

    fn recompute_if_changed(&mut self, now: Instant) {
        let version = self.protocol.topology_version();
        if version == self.table_version {
            return;
        }
        self.table_version = version;
        self.last_change = now;
        if self.state == NodeState::Stable {
            info!(node = %self.identity, version, "topology changed, converging");
            self.state = NodeState::Converging;
        }

        let table = self.protocol.compute_table();
        self.counters.tables_computed += 1;
        let diff = table.diff(&self.table);
        if !diff.is_empty() {
            info!(
                node = %self.identity,
                version,
                added = ?diff.added,
                removed = ?diff.removed,
                changed = ?diff.changed,
                "routing table updated"
            );
        }
        self.table = Arc::new(table);
    }

    fn route(&mut self, outbound: Vec<Outbound<I>>, now: Instant) -> Vec<Envelope<I>> {
        self.counters.sent += outbound.len() as u64;
        outbound
            .into_iter()
            .map(|out| {
                if let Some(reliable) = &self.reliable {
                    reliable.track(out.to.clone(), out.message.clone(), now);
                }
                Envelope {
                    to: out.to,
                    message: out.message.into_wire(self.identity.clone()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstate_core::{LinkCost, LinkStatePacket, SimulationIdentity};
    use std::collections::BTreeMap;

    fn make_id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn core(owner: char, links: &[(char, f64)], config: &ProtocolConfig, now: Instant) -> NodeCore<SimulationIdentity> {
        let neighbors = NeighborSet::with_neighbors(
            make_id(owner),
            links.iter().map(|(n, c)| (make_id(*n), LinkCost::new(*c).unwrap())),
        )
        .unwrap();
        NodeCore::new(neighbors, config, now)
    }

    fn lsp(source: char, seq: u64, links: &[(char, f64)]) -> WireMessage<SimulationIdentity> {
        WireMessage::LspFlood {
            sender: make_id(source),
            packet: LinkStatePacket::originate(
                make_id(source),
                seq,
                40,
                links
                    .iter()
                    .map(|(n, c)| (make_id(*n), LinkCost::new(*c).unwrap()))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }

    #[test]
    fn test_initialize_floods_and_converges() {
        let now = Instant::now();
        let mut node = core('A', &[('B', 7.0), ('I', 1.0)], &ProtocolConfig::fast(), now);
        assert_eq!(node.state(), NodeState::Initializing);

        let out = node.initialize(now);
        assert_eq!(out.iter().map(|e| e.to).collect::<Vec<_>>(), vec![make_id('B'), make_id('I')]);
        assert_eq!(node.state(), NodeState::Converging);
        assert_eq!(node.status().sequence_number, 1);
        assert_eq!(node.counters().sent, 2);
    }

    #[test]
    fn test_settles_after_quiet_period() {
        let now = Instant::now();
        let config = ProtocolConfig::fast().with_quiet_period(Duration::from_millis(100));
        let mut node = core('A', &[('B', 1.0)], &config, now);
        node.initialize(now);

        assert!(!node.settle(now + Duration::from_millis(50)));
        assert!(node.settle(now + Duration::from_millis(100)));
        assert_eq!(node.state(), NodeState::Stable);

        // Any topology change goes back to Converging
        node.handle_message(&make_id('B'), lsp('B', 1, &[('A', 1.0)]), now + Duration::from_millis(150));
        assert_eq!(node.state(), NodeState::Converging);
    }

    #[test]
    fn test_received_lsp_updates_table_and_counters() {
        let now = Instant::now();
        let mut node = core('A', &[('B', 7.0), ('I', 1.0)], &ProtocolConfig::fast(), now);
        node.initialize(now);

        let out = node.handle_message(&make_id('I'), lsp('I', 1, &[('A', 1.0), ('D', 6.0)]), now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, make_id('B'));

        let table = node.routing_table();
        assert_eq!(table.get(&make_id('D')).unwrap().total_cost, LinkCost::new(7.0).unwrap());

        node.handle_message(&make_id('B'), lsp('I', 1, &[('A', 1.0), ('D', 6.0)]), now);
        node.handle_message(&make_id('B'), lsp('I', 1, &[('Z', 1.0)]), now);

        let counters = node.counters();
        assert_eq!(counters.received, 3);
        assert_eq!(counters.packets_installed, 1);
        assert_eq!(counters.stale_rejected, 1);
        assert_eq!(counters.corrupt_rejected, 1);
    }

    #[test]
    fn test_decode_error_counted() {
        let now = Instant::now();
        let mut node = core('A', &[('B', 1.0)], &ProtocolConfig::fast(), now);
        let out = node.handle_frame(&make_id('B'), b"{not json", now);
        assert!(out.is_empty());
        assert_eq!(node.counters().decode_errors, 1);
    }

    #[test]
    fn test_hello_and_status_requests_answered() {
        let now = Instant::now();
        let mut node = core('A', &[('B', 1.0)], &ProtocolConfig::fast(), now);
        node.initialize(now);
        let before = node.status();

        let hello = node.handle_message(&make_id('M'), WireMessage::Hello { from: make_id('M') }, now);
        assert!(matches!(hello[0].message, WireMessage::HelloResponse { from, .. } if from == make_id('A')));

        let status = node.handle_message(&make_id('M'), WireMessage::StatusRequest { from: make_id('M') }, now);
        let WireMessage::StatusResponse { status } = &status[0].message else {
            panic!("expected status response");
        };
        assert_eq!(status.neighbors.len(), 1);
        assert_eq!(status.lsdb_size, 1);
        assert_eq!(node.status(), before);
    }

    #[test]
    fn test_noop_neighbor_change_does_not_reoriginate() {
        let now = Instant::now();
        let mut node = core('A', &[('B', 1.0)], &ProtocolConfig::fast(), now);
        node.initialize(now);

        let out = node
            .change_neighbor(NeighborChange::set_cost(make_id('B'), 1.0).unwrap(), now)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(node.status().sequence_number, 1);

        let out = node
            .change_neighbor(NeighborChange::set_cost(make_id('B'), 4.0).unwrap(), now)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(node.status().sequence_number, 2);
    }

    #[test]
    fn test_self_loop_rejected() {
        let now = Instant::now();
        let mut node = core('A', &[('B', 1.0)], &ProtocolConfig::fast(), now);
        let result = node.change_neighbor(NeighborChange::add(make_id('A'), 1.0).unwrap(), now);
        assert!(result.is_err());
    }

    #[test]
    fn test_reliable_mode_acks_and_demotes() {
        let now = Instant::now();
        let config = ProtocolConfig::fast().with_reliable_delivery(Duration::from_millis(10), 2);
        let mut node = core('A', &[('B', 1.0), ('C', 1.0)], &config, now);
        node.initialize(now);
        assert_eq!(node.pending_acks(), 2);

        // Incoming routing messages are always acknowledged
        let out = node.handle_message(&make_id('C'), lsp('C', 1, &[('A', 1.0)]), now);
        assert!(matches!(&out[0].message, WireMessage::Ack { source, sequence_number: 1, .. } if *source == make_id('C')));

        // C acknowledges our packet, B never does
        node.handle_message(
            &make_id('C'),
            WireMessage::Ack {
                source: make_id('A'),
                sequence_number: 1,
                from: make_id('C'),
            },
            now,
        );
        assert_eq!(node.counters().acks_received, 1);

        // Outstanding for B: our own packet and C's packet we forwarded
        let tick = |n: u64| now + Duration::from_millis(10 * n);
        assert_eq!(node.poll_retransmissions(tick(1)).len(), 2);
        assert_eq!(node.poll_retransmissions(tick(2)).len(), 2);

        let out = node.poll_retransmissions(tick(3));
        assert!(!node.neighbors().contains(&make_id('B')));
        assert_eq!(node.counters().adjacency_demotions, 1);
        assert_eq!(node.counters().retransmissions, 4);
        // The new self-advertisement goes to the remaining neighbor
        assert_eq!(out.iter().map(|e| e.to).collect::<Vec<_>>(), vec![make_id('C')]);
        assert_eq!(node.status().sequence_number, 2);
    }
}
