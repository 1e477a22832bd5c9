//! Shortest-path first
//!
//! Dijkstra over a [`TopologySnapshot`] with a binary-heap frontier,
//! O((V + E) log V).
//!
//! ## Tie-break
//!
//! The frontier pops in ascending `(total cost, node id)` order and each
//! node's neighbors are relaxed in ascending id order. A tentative route is
//! only replaced by a strictly cheaper one, so among equal-cost paths the
//! first discovered under that order wins. Identical snapshots therefore
//! always produce identical tables, down to the chosen path.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use linkstate_core::{LinkCost, PeerIdentity};
use tracing::{instrument, trace};

use crate::lsdb::TopologySnapshot;
use crate::table::{Route, RoutingTable};

/// Stateless shortest-path computation
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestPathEngine;

impl ShortestPathEngine {
    /// Compute least-cost routes from `source` to every reachable node
    #[instrument(skip(snapshot), fields(version = snapshot.version, sources = snapshot.graph.len()))]
    pub fn compute<I: PeerIdentity>(snapshot: &TopologySnapshot<I>, source: &I) -> RoutingTable<I> {
        let mut dist: BTreeMap<I, LinkCost> = BTreeMap::new();
        let mut prev: BTreeMap<I, I> = BTreeMap::new();
        let mut settled: BTreeSet<I> = BTreeSet::new();
        let mut frontier = BinaryHeap::new();

        dist.insert(source.clone(), LinkCost::ZERO);
        frontier.push(Reverse((LinkCost::ZERO, source.clone())));

        while let Some(Reverse((cost, node))) = frontier.pop() {
            if !settled.insert(node.clone()) {
                continue;
            }
            trace!(node = %node, %cost, "settled");

            let Some(edges) = snapshot.neighbors_of(&node) else {
                continue;
            };
            for (neighbor, weight) in edges {
                if settled.contains(neighbor) {
                    continue;
                }
                let candidate = cost + *weight;
                let improves = dist.get(neighbor).is_none_or(|best| candidate < *best);
                if improves {
                    dist.insert(neighbor.clone(), candidate);
                    prev.insert(neighbor.clone(), node.clone());
                    frontier.push(Reverse((candidate, neighbor.clone())));
                }
            }
        }

        let routes = dist
            .iter()
            .filter(|(destination, _)| *destination != source)
            .filter_map(|(destination, cost)| {
                let path = walk_back(&prev, source, destination)?;
                Some((
                    destination.clone(),
                    Route {
                        destination: destination.clone(),
                        next_hop: path[1].clone(),
                        total_cost: *cost,
                        path,
                    },
                ))
            })
            .collect();

        RoutingTable::new(source.clone(), snapshot.version, routes)
    }
}

/// Rebuild `source ..= destination` from predecessor links
fn walk_back<I: PeerIdentity>(prev: &BTreeMap<I, I>, source: &I, destination: &I) -> Option<Vec<I>> {
    let mut path = vec![destination.clone()];
    let mut current = destination;
    while current != source {
        current = prev.get(current)?;
        path.push(current.clone());
        if path.len() > prev.len() + 1 {
            return None;
        }
    }
    path.reverse();
    (path.len() >= 2).then_some(path)
}
