//! Property tests over random connected topologies

use linkstate_core::{Algorithm, SimulationIdentity};
use linkstate_node::ProtocolConfig;
use linkstate_simulation::{LockstepSimulation, Topology, topology};
use proptest::prelude::*;

/// A ring over `count` nodes plus extra chords, all with random costs
fn connected_topology() -> impl Strategy<Value = Topology<SimulationIdentity>> {
    (3usize..9)
        .prop_flat_map(|count| {
            (
                Just(count),
                prop::collection::vec(1u32..20, count),
                prop::collection::vec((0..count, 0..count, 1u32..20), 0..8),
            )
        })
        .prop_map(|(count, ring_costs, chords)| {
            let ids = topology::linear(count).unwrap().nodes();
            let mut topology = Topology::new();
            for (i, cost) in ring_costs.into_iter().enumerate() {
                topology
                    .add_link(ids[i], ids[(i + 1) % count], f64::from(cost))
                    .unwrap();
            }
            for (a, b, cost) in chords {
                // Self-loops and repeats are simply skipped
                let _ = topology.add_link(ids[a], ids[b], f64::from(cost));
            }
            topology
        })
}

fn converge(topology: Topology<SimulationIdentity>, algorithm: Algorithm) -> LockstepSimulation<SimulationIdentity> {
    let config = ProtocolConfig::fast().with_algorithm(algorithm);
    let mut sim = LockstepSimulation::new(topology, config).unwrap();
    sim.initialize();
    sim.run_until_quiet(1_000_000).unwrap();
    sim
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn link_state_converges_with_symmetric_costs(topology in connected_topology()) {
        let count = topology.node_count();
        let sim = converge(topology, Algorithm::LinkState);

        prop_assert!(sim.is_converged());
        prop_assert_eq!(sim.max_forward_count(), 1);

        let tables = sim.tables();
        for (source, table) in &tables {
            prop_assert_eq!(table.len(), count - 1);
            for route in table.routes() {
                prop_assert_eq!(route.path.first(), Some(source));
                prop_assert_eq!(route.path.last(), Some(&route.destination));
                let back = tables[&route.destination].get(source).unwrap();
                prop_assert_eq!(back.total_cost, route.total_cost);
            }
        }
    }

    #[test]
    fn distance_vector_agrees_with_link_state(topology in connected_topology()) {
        let ls = converge(topology.clone(), Algorithm::LinkState);
        let dv = converge(topology, Algorithm::DistanceVector);

        for (node, table) in dv.tables() {
            let reference = ls.routing_table(&node).unwrap();
            prop_assert_eq!(table.len(), reference.len());
            for route in table.routes() {
                prop_assert_eq!(route.total_cost, reference.get(&route.destination).unwrap().total_cost);
            }
        }
    }

    #[test]
    fn identical_runs_produce_identical_tables(topology in connected_topology()) {
        let first = converge(topology.clone(), Algorithm::LinkState);
        let second = converge(topology, Algorithm::LinkState);
        prop_assert_eq!(first.tables(), second.tables());
        prop_assert_eq!(first.stats(), second.stats());
    }
}
