//! Network topologies
//!
//! A [`Topology`] is a set of nodes and undirected weighted links. Each
//! node's neighbor configuration is read off its incident links. Provides:
//! - Generators: linear, ring, star, full mesh (unit costs)
//! - The nine-node reference network used by the scenarios
//! - Edge lists and TOML topology files, validated on load

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use linkstate_core::{LinkCost, PeerIdentity, SimulationIdentity};
use serde::Deserialize;

use crate::error::TopologyError;

/// One undirected link
#[derive(Debug, Clone, PartialEq)]
pub struct Link<I> {
    pub a: I,
    pub b: I,
    pub cost: LinkCost,
}

/// Nodes plus undirected weighted links
#[derive(Debug, Clone, PartialEq)]
pub struct Topology<I: PeerIdentity> {
    nodes: BTreeSet<I>,
    /// Keyed by (smaller, larger) endpoint
    links: BTreeMap<(I, I), LinkCost>,
}

fn link_key<I: PeerIdentity>(a: &I, b: &I) -> (I, I) {
    if a < b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl<I: PeerIdentity> Topology<I> {
    /// Empty topology
    pub fn new() -> Self {
        Self {
            nodes: BTreeSet::new(),
            links: BTreeMap::new(),
        }
    }

    /// Add a node with no links; returns false if it already existed
    pub fn add_node(&mut self, id: I) -> bool {
        self.nodes.insert(id)
    }

    /// Add an undirected link, creating missing endpoints
    pub fn add_link(&mut self, a: I, b: I, cost: f64) -> Result<(), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLoop(a.to_string()));
        }
        let cost = LinkCost::new(cost).map_err(|e| TopologyError::InvalidCost {
            a: a.to_string(),
            b: b.to_string(),
            reason: e.to_string(),
        })?;
        let key = link_key(&a, &b);
        if self.links.contains_key(&key) {
            return Err(TopologyError::DuplicateLink {
                a: key.0.to_string(),
                b: key.1.to_string(),
            });
        }

        self.nodes.insert(a);
        self.nodes.insert(b);
        self.links.insert(key, cost);
        Ok(())
    }

    /// Copy with the link `a`-`b` added
    pub fn with_link(&self, a: I, b: I, cost: f64) -> Result<Self, TopologyError> {
        let mut next = self.clone();
        next.add_link(a, b, cost)?;
        Ok(next)
    }

    /// Copy with the link `a`-`b` removed; both nodes stay
    pub fn without_link(&self, a: &I, b: &I) -> Result<Self, TopologyError> {
        let mut next = self.clone();
        if next.links.remove(&link_key(a, b)).is_none() {
            return Err(TopologyError::UnknownLink {
                a: a.to_string(),
                b: b.to_string(),
            });
        }
        Ok(next)
    }

    /// All node ids, ascending
    pub fn nodes(&self) -> Vec<I> {
        self.nodes.iter().cloned().collect()
    }

    pub fn contains(&self, id: &I) -> bool {
        self.nodes.contains(id)
    }

    /// All links, ordered by endpoints
    pub fn links(&self) -> Vec<Link<I>> {
        self.links
            .iter()
            .map(|((a, b), cost)| Link {
                a: a.clone(),
                b: b.clone(),
                cost: *cost,
            })
            .collect()
    }

    /// Link endpoint pairs, for wiring transports
    pub fn link_pairs(&self) -> Vec<(I, I)> {
        self.links.keys().cloned().collect()
    }

    /// Cost of the link between `a` and `b`
    pub fn cost(&self, a: &I, b: &I) -> Option<LinkCost> {
        self.links.get(&link_key(a, b)).copied()
    }

    pub fn are_connected(&self, a: &I, b: &I) -> bool {
        self.links.contains_key(&link_key(a, b))
    }

    /// Direct neighbors of `id` with their link costs
    pub fn neighbors_of(&self, id: &I) -> BTreeMap<I, LinkCost> {
        self.links
            .iter()
            .filter_map(|((a, b), cost)| {
                if a == id {
                    Some((b.clone(), *cost))
                } else if b == id {
                    Some((a.clone(), *cost))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Neighbor configuration for `id`, as a node takes it at startup
    pub fn neighbor_config(&self, id: &I) -> Vec<(I, f64)> {
        self.neighbors_of(id)
            .into_iter()
            .map(|(neighbor, cost)| (neighbor, cost.value()))
            .collect()
    }

    /// Connected components, each ascending, ordered by smallest member
    pub fn components(&self) -> Vec<BTreeSet<I>> {
        let mut remaining = self.nodes.clone();
        let mut components = Vec::new();

        while let Some(start) = remaining.pop_first() {
            let mut component = BTreeSet::from([start.clone()]);
            let mut frontier = vec![start];
            while let Some(node) = frontier.pop() {
                for neighbor in self.neighbors_of(&node).into_keys() {
                    if remaining.remove(&neighbor) {
                        component.insert(neighbor.clone());
                        frontier.push(neighbor);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Nodes reachable from `id`, including itself
    pub fn component_of(&self, id: &I) -> BTreeSet<I> {
        self.components()
            .into_iter()
            .find(|component| component.contains(id))
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Text rendering: one adjacency line per node
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count()));
        output.push_str(&format!("  Links: {}\n\n", self.link_count()));

        for node in &self.nodes {
            let neighbors: Vec<String> = self
                .neighbors_of(node)
                .iter()
                .map(|(neighbor, cost)| format!("{}({})", neighbor, cost))
                .collect();
            output.push_str(&format!("  {} -> [{}]\n", node, neighbors.join(", ")));
        }
        output
    }
}

impl<I: PeerIdentity> Default for Topology<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Topology<I>
where
    I: PeerIdentity + FromStr,
    I::Err: std::fmt::Display,
{
    /// Parse a TOML topology
    ///
    /// ```toml
    /// nodes = ["A", "B", "C"]   # optional
    ///
    /// [[link]]
    /// a = "A"
    /// b = "B"
    /// cost = 7
    /// ```
    ///
    /// When `nodes` is present every link endpoint must be listed in it.
    pub fn from_toml_str(s: &str) -> Result<Self, TopologyError> {
        let file: TopologyFile = toml::from_str(s)?;
        let parse = |raw: &str| {
            raw.parse::<I>()
                .map_err(|e| TopologyError::InvalidIdentity(format!("{}: {}", raw, e)))
        };

        let mut topology = Self::new();
        let declared = file.nodes.is_some();
        for raw in file.nodes.unwrap_or_default() {
            if !topology.add_node(parse(&raw)?) {
                return Err(TopologyError::DuplicateNode(raw));
            }
        }

        for link in file.links {
            let a = parse(&link.a)?;
            let b = parse(&link.b)?;
            if declared {
                for endpoint in [&a, &b] {
                    if !topology.contains(endpoint) {
                        return Err(TopologyError::UnknownEndpoint(endpoint.to_string()));
                    }
                }
            }
            topology.add_link(a, b, link.cost)?;
        }
        Ok(topology)
    }

    /// Read and parse a TOML topology file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, Deserialize)]
struct TopologyFile {
    nodes: Option<Vec<String>>,
    #[serde(default, rename = "link")]
    links: Vec<LinkEntry>,
}

#[derive(Debug, Deserialize)]
struct LinkEntry {
    a: String,
    b: String,
    cost: f64,
}

fn letters(count: usize) -> Result<Vec<SimulationIdentity>, TopologyError> {
    if count > 26 {
        return Err(TopologyError::TooManyNodes(count));
    }
    Ok(('A'..='Z').take(count).filter_map(SimulationIdentity::new).collect())
}

/// Build a topology from `(a, b, cost)` triples over single-letter nodes
pub fn from_edges(edges: &[(char, char, f64)]) -> Result<Topology<SimulationIdentity>, TopologyError> {
    let mut topology = Topology::new();
    for &(a, b, cost) in edges {
        let node = |c: char| {
            SimulationIdentity::new(c).ok_or_else(|| TopologyError::InvalidIdentity(c.to_string()))
        };
        topology.add_link(node(a)?, node(b)?, cost)?;
    }
    Ok(topology)
}

/// A - B - C - ... with unit costs
pub fn linear(count: usize) -> Result<Topology<SimulationIdentity>, TopologyError> {
    let ids = letters(count)?;
    let mut topology = Topology::new();
    for id in &ids {
        topology.add_node(*id);
    }
    for pair in ids.windows(2) {
        topology.add_link(pair[0], pair[1], 1.0)?;
    }
    Ok(topology)
}

/// Linear plus a link closing the loop; needs at least three nodes
pub fn ring(count: usize) -> Result<Topology<SimulationIdentity>, TopologyError> {
    let mut topology = linear(count)?;
    if count >= 3 {
        let ids = topology.nodes();
        topology.add_link(ids[count - 1], ids[0], 1.0)?;
    }
    Ok(topology)
}

/// A in the center, linked to every other node
pub fn star(count: usize) -> Result<Topology<SimulationIdentity>, TopologyError> {
    let ids = letters(count)?;
    let mut topology = Topology::new();
    let Some((center, rest)) = ids.split_first() else {
        return Ok(topology);
    };
    topology.add_node(*center);
    for leaf in rest {
        topology.add_link(*center, *leaf, 1.0)?;
    }
    Ok(topology)
}

/// Every node linked to every other
pub fn mesh(count: usize) -> Result<Topology<SimulationIdentity>, TopologyError> {
    let ids = letters(count)?;
    let mut topology = Topology::new();
    for (i, a) in ids.iter().enumerate() {
        topology.add_node(*a);
        for b in &ids[i + 1..] {
            topology.add_link(*a, *b, 1.0)?;
        }
    }
    Ok(topology)
}

/// Links of the nine-node reference network
pub const SAMPLE_LINKS: [(char, char, f64); 11] = [
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

/// The nine-node reference network, A through I
pub fn sample() -> Result<Topology<SimulationIdentity>, TopologyError> {
    from_edges(&SAMPLE_LINKS)
}
