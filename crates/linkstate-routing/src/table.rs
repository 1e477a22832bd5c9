//! Routing tables
//!
//! A [`RoutingTable`] is a disposable artifact: the shortest-path engine
//! builds a fresh one from a database snapshot and the node swaps it in
//! atomically. Tables are never patched in place.

use std::collections::BTreeMap;
use std::fmt::Display;

use linkstate_core::{LinkCost, PeerIdentity};
use serde::{Deserialize, Serialize};

/// Best route to one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct Route<I: PeerIdentity> {
    /// Destination node
    pub destination: I,
    /// First hop after the source; always `path[1]`
    pub next_hop: I,
    /// Sum of link costs along `path`
    pub total_cost: LinkCost,
    /// Source to destination, inclusive
    pub path: Vec<I>,
}

impl<I: PeerIdentity> Route<I> {
    /// Number of links traversed
    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Whether the route passes through `node` (endpoints included)
    pub fn traverses(&self, node: &I) -> bool {
        self.path.contains(node)
    }

    /// Path rendered as `A -> I -> D`
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Differences between two tables, by destination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff<I: PeerIdentity> {
    /// Destinations only in the newer table
    pub added: Vec<I>,
    /// Destinations only in the older table
    pub removed: Vec<I>,
    /// Destinations whose next hop, cost, or path changed
    pub changed: Vec<I>,
}

impl<I: PeerIdentity> TableDiff<I> {
    /// Whether the two tables route identically
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Full routing table for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct RoutingTable<I: PeerIdentity> {
    source: I,
    computed_from: u64,
    routes: BTreeMap<I, Route<I>>,
}

impl<I: PeerIdentity> RoutingTable<I> {
    /// Assemble a table
    pub fn new(source: I, computed_from: u64, routes: BTreeMap<I, Route<I>>) -> Self {
        Self {
            source,
            computed_from,
            routes,
        }
    }

    /// Table with no routes
    pub fn empty(source: I) -> Self {
        Self::new(source, 0, BTreeMap::new())
    }

    /// Node the table was computed for
    pub fn source(&self) -> &I {
        &self.source
    }

    /// Topology version the table was computed from
    pub fn computed_from(&self) -> u64 {
        self.computed_from
    }

    /// Route to a destination; unreachable destinations have none
    pub fn get(&self, destination: &I) -> Option<&Route<I>> {
        self.routes.get(destination)
    }

    /// Next hop toward a destination
    pub fn next_hop(&self, destination: &I) -> Option<&I> {
        self.routes.get(destination).map(|route| &route.next_hop)
    }

    /// Reachable destinations in ascending order
    pub fn destinations(&self) -> Vec<I> {
        self.routes.keys().cloned().collect()
    }

    /// Iterate routes in ascending destination order
    pub fn routes(&self) -> impl Iterator<Item = &Route<I>> {
        self.routes.values()
    }

    /// Number of reachable destinations
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing is reachable
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Whether both tables hold the same routes, ignoring version
    pub fn same_routes(&self, other: &Self) -> bool {
        self.routes == other.routes
    }

    /// What changed going from `previous` to `self`
    pub fn diff(&self, previous: &Self) -> TableDiff<I> {
        let mut diff = TableDiff {
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
        };

        for (destination, route) in &self.routes {
            match previous.routes.get(destination) {
                None => diff.added.push(destination.clone()),
                Some(old) if old != route => diff.changed.push(destination.clone()),
                Some(_) => {}
            }
        }
        diff.removed = previous
            .routes
            .keys()
            .filter(|destination| !self.routes.contains_key(*destination))
            .cloned()
            .collect();

        diff
    }
}

impl<I: PeerIdentity> Display for RoutingTable<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Routing table for {} (topology v{})",
            self.source, self.computed_from
        )?;
        writeln!(f, "{:<12} | {:<10} | {:>8} | path", "destination", "next hop", "cost")?;
        writeln!(f, "{}", "-".repeat(48))?;
        for route in self.routes.values() {
            writeln!(
                f,
                "{:<12} | {:<10} | {:>8} | {}",
                route.destination.to_string(),
                route.next_hop.to_string(),
                route.total_cost.to_string(),
                route.path_string()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstate_core::SimulationIdentity;

    fn make_id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn make_route(path: &str, cost: f64) -> Route<SimulationIdentity> {
        let path: Vec<_> = path.chars().map(make_id).collect();
        Route {
            destination: *path.last().unwrap(),
            next_hop: path[1],
            total_cost: LinkCost::new(cost).unwrap(),
            path,
        }
    }

    fn make_table(version: u64, routes: &[(&str, f64)]) -> RoutingTable<SimulationIdentity> {
        let routes = routes
            .iter()
            .map(|(path, cost)| {
                let route = make_route(path, *cost);
                (route.destination, route)
            })
            .collect();
        RoutingTable::new(make_id('A'), version, routes)
    }

    #[test]
    fn test_lookup() {
        let table = make_table(3, &[("AID", 7.0), ("AB", 7.0)]);
        assert_eq!(table.next_hop(&make_id('D')), Some(&make_id('I')));
        assert_eq!(table.get(&make_id('D')).unwrap().hop_count(), 2);
        assert!(table.get(&make_id('Z')).is_none());
        assert_eq!(table.destinations(), vec![make_id('B'), make_id('D')]);
        assert_eq!(table.computed_from(), 3);
    }

    #[test]
    fn test_diff() {
        let old = make_table(1, &[("AB", 7.0), ("AID", 7.0), ("AC", 7.0)]);
        let new = make_table(2, &[("AB", 7.0), ("AIE", 2.0), ("ABC", 9.0)]);

        let diff = new.diff(&old);
        assert_eq!(diff.added, vec![make_id('E')]);
        assert_eq!(diff.removed, vec![make_id('D')]);
        assert_eq!(diff.changed, vec![make_id('C')]);
        assert!(new.diff(&new).is_empty());
    }

    #[test]
    fn test_same_routes_ignores_version() {
        let a = make_table(1, &[("AB", 7.0)]);
        let b = make_table(9, &[("AB", 7.0)]);
        assert!(a.same_routes(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let table = make_table(4, &[("AID", 7.0)]);
        let rendered = table.to_string();
        assert!(rendered.contains("Routing table for A (topology v4)"));
        assert!(rendered.contains("A -> I -> D"));
    }
}
