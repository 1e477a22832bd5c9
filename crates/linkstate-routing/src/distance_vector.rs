//! Distance-vector routing (path-vector Bellman-Ford)
//!
//! Each node advertises `destination -> (cost, path)` to its direct
//! neighbors only and keeps the latest vector from each of them. Carrying
//! the full path lets a node reject any route that already passes through
//! itself, which rules out count-to-infinity loops.
//!
//! Vectors are neighbor-scoped, never flooded. A node re-advertises only
//! when its own best routes change, or on refresh.

use std::collections::BTreeMap;

use chrono::Utc;
use linkstate_core::{
    AdvertisedRoute, Algorithm, DistanceVector, LinkCost, PeerIdentity, RoutingMessage,
};
use tracing::{debug, info};

use crate::neighbors::NeighborSet;
use crate::protocol::{AgeTick, DatabaseEntry, Outbound, Reception, RoutingProtocol};
use crate::table::{Route, RoutingTable};

#[derive(Debug, Clone)]
struct HeldVector<I: PeerIdentity> {
    vector: DistanceVector<I>,
    age: u32,
}

/// Distance-vector protocol state for one node
#[derive(Debug, Clone)]
pub struct DistanceVectorProtocol<I: PeerIdentity> {
    owner: I,
    sequence: u64,
    max_age: u32,
    links: BTreeMap<I, LinkCost>,
    vectors: BTreeMap<I, HeldVector<I>>,
    /// Current best routes; every path starts at `owner`
    best: BTreeMap<I, AdvertisedRoute<I>>,
    version: u64,
}

impl<I: PeerIdentity> DistanceVectorProtocol<I> {
    /// Create state for `owner`; held vectors expire after `max_age` ticks
    pub fn new(owner: I, max_age: u32) -> Self {
        Self {
            owner,
            sequence: 0,
            max_age,
            links: BTreeMap::new(),
            vectors: BTreeMap::new(),
            best: BTreeMap::new(),
            version: 0,
        }
    }

    /// Current best route to a destination
    pub fn best_route(&self, destination: &I) -> Option<&AdvertisedRoute<I>> {
        self.best.get(destination)
    }

    /// Re-derive best routes; returns whether they changed
    ///
    /// Neighbors are considered in ascending id order and a candidate only
    /// replaces a strictly more expensive one.
    fn recompute(&mut self) -> bool {
        let mut best: BTreeMap<I, AdvertisedRoute<I>> = BTreeMap::new();

        for (neighbor, link) in &self.links {
            offer(
                &mut best,
                neighbor.clone(),
                *link,
                vec![self.owner.clone(), neighbor.clone()],
            );

            let Some(held) = self.vectors.get(neighbor) else {
                continue;
            };
            for (destination, route) in &held.vector.routes {
                let well_formed = route.path.first() == Some(neighbor)
                    && route.path.last() == Some(destination);
                if *destination == self.owner || !well_formed || route.path.contains(&self.owner) {
                    continue;
                }
                let mut path = Vec::with_capacity(route.path.len() + 1);
                path.push(self.owner.clone());
                path.extend(route.path.iter().cloned());
                offer(&mut best, destination.clone(), *link + route.cost, path);
            }
        }

        let changed = best != self.best;
        self.best = best;
        changed
    }

    fn advertise(&mut self, neighbors: &NeighborSet<I>) -> Vec<Outbound<I>> {
        self.sequence += 1;
        let vector = DistanceVector {
            source: self.owner.clone(),
            sequence_number: self.sequence,
            routes: self.best.clone(),
            created_at: Utc::now(),
        };
        debug!(owner = %self.owner, seq = self.sequence, routes = vector.routes.len(), "advertising vector");
        Outbound::fan_out(neighbors.ids(), &RoutingMessage::DistanceVector(vector))
    }
}

fn offer<I: PeerIdentity>(
    best: &mut BTreeMap<I, AdvertisedRoute<I>>,
    destination: I,
    cost: LinkCost,
    path: Vec<I>,
) {
    let better = best.get(&destination).is_none_or(|current| cost < current.cost);
    if better {
        best.insert(destination, AdvertisedRoute { cost, path });
    }
}

impl<I: PeerIdentity> RoutingProtocol<I> for DistanceVectorProtocol<I> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::DistanceVector
    }

    fn on_local_change(&mut self, neighbors: &NeighborSet<I>) -> Vec<Outbound<I>> {
        if self.links != *neighbors.as_map() {
            self.links = neighbors.as_map().clone();
            self.vectors.retain(|source, _| neighbors.contains(source));
            self.version += 1;
        }
        self.recompute();
        self.advertise(neighbors)
    }

    fn on_packet_received(
        &mut self,
        from: &I,
        message: RoutingMessage<I>,
        neighbors: &NeighborSet<I>,
    ) -> Reception<I> {
        let RoutingMessage::DistanceVector(vector) = message else {
            return Reception::Ignored;
        };
        if vector.source != *from || !neighbors.contains(from) {
            return Reception::Ignored;
        }
        if self
            .vectors
            .get(from)
            .is_some_and(|held| vector.sequence_number <= held.vector.sequence_number)
        {
            return Reception::Stale;
        }

        self.links = neighbors.as_map().clone();
        self.vectors.insert(
            from.clone(),
            HeldVector {
                vector,
                age: self.max_age,
            },
        );
        self.version += 1;

        let outbound = if self.recompute() {
            self.advertise(neighbors)
        } else {
            Vec::new()
        };
        Reception::Installed { outbound }
    }

    fn on_age_tick(&mut self, elapsed_ticks: u32, neighbors: &NeighborSet<I>) -> AgeTick<I> {
        let mut expired = Vec::new();
        for (source, held) in self.vectors.iter_mut() {
            held.age = held.age.saturating_sub(elapsed_ticks);
            if held.age == 0 {
                expired.push(source.clone());
            }
        }
        if expired.is_empty() {
            return AgeTick::default();
        }

        for source in &expired {
            self.vectors.remove(source);
            info!(owner = %self.owner, source = %source, "vector aged out");
        }
        self.version += 1;

        let outbound = if self.recompute() {
            self.advertise(neighbors)
        } else {
            Vec::new()
        };
        AgeTick { expired, outbound }
    }

    fn compute_table(&self) -> RoutingTable<I> {
        let routes = self
            .best
            .iter()
            .filter_map(|(destination, route)| {
                let next_hop = route.path.get(1)?.clone();
                Some((
                    destination.clone(),
                    Route {
                        destination: destination.clone(),
                        next_hop,
                        total_cost: route.cost,
                        path: route.path.clone(),
                    },
                ))
            })
            .collect();
        RoutingTable::new(self.owner.clone(), self.version, routes)
    }

    fn topology_version(&self) -> u64 {
        self.version
    }

    fn database_size(&self) -> usize {
        self.vectors.len()
    }

    fn database_entries(&self) -> Vec<DatabaseEntry<I>> {
        self.vectors
            .values()
            .map(|held| DatabaseEntry {
                source: held.vector.source.clone(),
                sequence_number: held.vector.sequence_number,
                age: held.age,
                costs: held
                    .vector
                    .routes
                    .iter()
                    .map(|(destination, route)| (destination.clone(), route.cost))
                    .collect(),
            })
            .collect()
    }

    fn sequence_number(&self) -> u64 {
        self.sequence
    }

    fn sequence_numbers(&self) -> BTreeMap<I, u64> {
        let mut seqs: BTreeMap<I, u64> = self
            .vectors
            .iter()
            .map(|(source, held)| (source.clone(), held.vector.sequence_number))
            .collect();
        seqs.insert(self.owner.clone(), self.sequence);
        seqs
    }
}
