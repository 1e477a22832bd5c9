//! Multi-node flooding tests driven by an in-process message queue
//!
//! Each node owns an independent `Protocol`; the only thing crossing node
//! boundaries is the queue of routing messages.

use std::collections::{BTreeMap, HashMap, VecDeque};

use linkstate_core::{
    Algorithm, LinkCost, LinkStatePacket, LspKey, RoutingMessage, SimulationIdentity,
};
use linkstate_routing::{
    NeighborChange, NeighborSet, Outbound, Protocol, Reception, RoutingProtocol,
};

fn make_id(c: char) -> SimulationIdentity {
    SimulationIdentity::new(c).unwrap()
}

/// The nine-node reference network
const SAMPLE_LINKS: &[(char, char, f64)] = &[
    ('A', 'B', 7.0),
    ('A', 'I', 1.0),
    ('A', 'C', 7.0),
    ('B', 'F', 2.0),
    ('I', 'D', 6.0),
    ('C', 'D', 5.0),
    ('D', 'F', 1.0),
    ('D', 'E', 1.0),
    ('F', 'G', 3.0),
    ('F', 'H', 4.0),
    ('G', 'E', 4.0),
];

struct Harness {
    neighbors: BTreeMap<SimulationIdentity, NeighborSet<SimulationIdentity>>,
    protocols: BTreeMap<SimulationIdentity, Protocol<SimulationIdentity>>,
    queue: VecDeque<(SimulationIdentity, Outbound<SimulationIdentity>)>,
    /// (sender, key, receiver) -> sends
    forwards: HashMap<(SimulationIdentity, LspKey<SimulationIdentity>, SimulationIdentity), usize>,
}

impl Harness {
    fn new(algorithm: Algorithm, links: &[(char, char, f64)]) -> Self {
        let mut neighbors: BTreeMap<_, NeighborSet<_>> = BTreeMap::new();
        for (a, b, cost) in links {
            let (a, b) = (make_id(*a), make_id(*b));
            let cost = LinkCost::new(*cost).unwrap();
            neighbors
                .entry(a)
                .or_insert_with(|| NeighborSet::new(a))
                .apply(NeighborChange::Add { neighbor: b, cost })
                .unwrap();
            neighbors
                .entry(b)
                .or_insert_with(|| NeighborSet::new(b))
                .apply(NeighborChange::Add { neighbor: a, cost })
                .unwrap();
        }
        let protocols = neighbors
            .keys()
            .map(|id| (*id, Protocol::new(algorithm, *id, 60)))
            .collect();

        Self {
            neighbors,
            protocols,
            queue: VecDeque::new(),
            forwards: HashMap::new(),
        }
    }

    fn enqueue(&mut self, from: SimulationIdentity, outbound: Vec<Outbound<SimulationIdentity>>) {
        for out in outbound {
            *self
                .forwards
                .entry((from, out.message.key(), out.to))
                .or_default() += 1;
            self.queue.push_back((from, out));
        }
    }

    fn originate_all(&mut self) {
        let ids: Vec<_> = self.protocols.keys().copied().collect();
        for id in ids {
            self.local_change(id);
        }
    }

    fn local_change(&mut self, id: SimulationIdentity) {
        let neighbors = &self.neighbors[&id];
        let out = self.protocols.get_mut(&id).unwrap().on_local_change(neighbors);
        self.enqueue(id, out);
    }

    fn run(&mut self) -> Vec<Reception<SimulationIdentity>> {
        let mut receptions = Vec::new();
        let mut steps = 0;
        while let Some((from, out)) = self.queue.pop_front() {
            steps += 1;
            assert!(steps < 100_000, "flood did not terminate");
            let neighbors = &self.neighbors[&out.to];
            let reception = self
                .protocols
                .get_mut(&out.to)
                .unwrap()
                .on_packet_received(&from, out.message, neighbors);
            let outbound = reception.outbound().to_vec();
            self.enqueue(out.to, outbound);
            receptions.push(reception);
        }
        receptions
    }

    fn table(&self, id: char) -> linkstate_routing::RoutingTable<SimulationIdentity> {
        self.protocols[&make_id(id)].compute_table()
    }
}

#[test]
fn test_sample_network_converges_to_identical_databases() {
    let mut harness = Harness::new(Algorithm::LinkState, SAMPLE_LINKS);
    harness.originate_all();
    harness.run();

    let reference = harness.protocols[&make_id('A')].sequence_numbers();
    assert_eq!(reference.len(), 9);
    for protocol in harness.protocols.values() {
        assert_eq!(protocol.sequence_numbers(), reference);
    }

    let table = harness.table('A');
    let route = table.get(&make_id('D')).unwrap();
    assert_eq!(route.path, vec![make_id('A'), make_id('I'), make_id('D')]);
    assert_eq!(route.total_cost, LinkCost::new(7.0).unwrap());
    assert_eq!(table.len(), 8);
}

#[test]
fn test_each_key_forwarded_at_most_once_per_neighbor() {
    let mut harness = Harness::new(Algorithm::LinkState, SAMPLE_LINKS);
    harness.originate_all();
    harness.run();

    // Deliver every node's current packet again from every neighbor
    let ids: Vec<_> = harness.protocols.keys().copied().collect();
    for id in &ids {
        let Some(RoutingMessage::Lsp(packet)) = current_packet(&harness, *id) else {
            panic!("no packet for {id}");
        };
        for neighbor in harness.neighbors[id].ids() {
            harness.queue.push_back((
                *id,
                Outbound {
                    to: neighbor,
                    message: RoutingMessage::Lsp(packet.clone()),
                },
            ));
        }
    }
    let receptions = harness.run();
    assert!(receptions.iter().all(|r| *r == Reception::Stale));

    for (key, count) in &harness.forwards {
        assert_eq!(*count, 1, "{:?} forwarded {} times", key, count);
    }
}

fn current_packet(harness: &Harness, id: SimulationIdentity) -> Option<RoutingMessage<SimulationIdentity>> {
    let Protocol::LinkState(protocol) = &harness.protocols[&id] else {
        return None;
    };
    protocol.lsdb().get(&id).cloned().map(RoutingMessage::Lsp)
}

#[test]
fn test_link_failure_and_recovery_on_h() {
    let mut harness = Harness::new(Algorithm::LinkState, SAMPLE_LINKS);
    harness.originate_all();
    harness.run();
    assert_eq!(
        harness.table('H').get(&make_id('A')).unwrap().total_cost,
        LinkCost::new(12.0).unwrap()
    );

    // F-H fails: both ends drop the adjacency and reflood
    for (node, other) in [('H', 'F'), ('F', 'H')] {
        harness
            .neighbors
            .get_mut(&make_id(node))
            .unwrap()
            .apply(NeighborChange::remove(make_id(other)))
            .unwrap();
        harness.local_change(make_id(node));
    }
    harness.run();

    let h = harness.table('H');
    assert!(h.routes().all(|route| !route.traverses(&make_id('F'))));
    assert!(h.is_empty());
    assert!(harness.table('A').get(&make_id('H')).is_none());

    // Restored with cost 6
    for (node, other) in [('H', 'F'), ('F', 'H')] {
        harness
            .neighbors
            .get_mut(&make_id(node))
            .unwrap()
            .apply(NeighborChange::add(make_id(other), 6.0).unwrap())
            .unwrap();
        harness.local_change(make_id(node));
    }
    harness.run();

    let h = harness.table('H');
    let to_a = h.get(&make_id('A')).unwrap();
    assert_eq!(to_a.total_cost, LinkCost::new(14.0).unwrap());
    assert_eq!(
        to_a.path,
        "HFDIA".chars().map(make_id).collect::<Vec<_>>()
    );
    assert_eq!(h.len(), 8);
}

#[test]
fn test_corrupt_packet_dropped_and_not_forwarded() {
    let mut harness = Harness::new(Algorithm::LinkState, SAMPLE_LINKS);
    harness.originate_all();
    harness.run();

    let before = harness.protocols[&make_id('D')].topology_version();
    let forged = LinkStatePacket::originate(
        make_id('A'),
        1,
        60,
        BTreeMap::from([(make_id('Z'), LinkCost::new(1.0).unwrap())]),
    );
    harness.queue.push_back((
        make_id('I'),
        Outbound {
            to: make_id('D'),
            message: RoutingMessage::Lsp(forged),
        },
    ));
    let receptions = harness.run();

    assert_eq!(receptions.len(), 1);
    assert!(matches!(receptions[0], Reception::Corrupt(_)));
    assert_eq!(harness.protocols[&make_id('D')].topology_version(), before);
}

#[test]
fn test_distance_vector_matches_link_state_tables() {
    let mut ls = Harness::new(Algorithm::LinkState, SAMPLE_LINKS);
    let mut dv = Harness::new(Algorithm::DistanceVector, SAMPLE_LINKS);
    ls.originate_all();
    ls.run();
    dv.originate_all();
    dv.run();

    for id in 'A'..='I' {
        let ls_table = ls.table(id);
        let dv_table = dv.table(id);
        assert_eq!(ls_table.destinations(), dv_table.destinations());
        for route in ls_table.routes() {
            assert_eq!(
                dv_table.get(&route.destination).unwrap().total_cost,
                route.total_cost,
                "{id} -> {}",
                route.destination
            );
        }
    }
}
