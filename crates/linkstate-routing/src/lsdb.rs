//! Link-state database
//!
//! One [`LinkStateDatabase`] per node: the latest accepted packet from every
//! known source. A new acceptance always replaces, never appends, and every
//! replacement or removal bumps [`version`](LinkStateDatabase::version).
//!
//! ## Aging
//!
//! [`tick_age`](LinkStateDatabase::tick_age) decrements every foreign
//! entry's remaining lifetime and removes the ones that reach zero. The
//! owner's entry is exempt: the runtime refreshes it.

use std::collections::BTreeMap;

use linkstate_core::{LinkCost, LinkStatePacket, PacketError, PeerIdentity, is_newer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Why a packet was not installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Not newer than the installed entry (steady-state flooding outcome)
    DuplicateOrStale,
    /// Sequence number reused with different neighbors
    Corrupt(PacketError),
}

/// Result of [`LinkStateDatabase::accept`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Replaced or created the source's entry
    Installed,
    /// Left the database untouched
    Rejected(RejectReason),
}

impl AcceptOutcome {
    /// Whether the packet was installed
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

/// Immutable adjacency view taken at one database version
///
/// Edges are directed as advertised by each source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct TopologySnapshot<I: PeerIdentity> {
    /// Database version this snapshot reflects
    pub version: u64,
    /// source -> (neighbor -> cost)
    pub graph: BTreeMap<I, BTreeMap<I, LinkCost>>,
}

impl<I: PeerIdentity> TopologySnapshot<I> {
    /// Build a snapshot directly from an adjacency map
    pub fn from_graph(version: u64, graph: BTreeMap<I, BTreeMap<I, LinkCost>>) -> Self {
        Self { version, graph }
    }

    /// Outgoing edges of a node, if it advertised any
    pub fn neighbors_of(&self, node: &I) -> Option<&BTreeMap<I, LinkCost>> {
        self.graph.get(node)
    }

    /// Number of advertising sources
    pub fn source_count(&self) -> usize {
        self.graph.len()
    }
}

/// Per-node store of the most recent packet from every source
#[derive(Debug, Clone)]
pub struct LinkStateDatabase<I: PeerIdentity> {
    owner: I,
    entries: BTreeMap<I, LinkStatePacket<I>>,
    version: u64,
}

impl<I: PeerIdentity> LinkStateDatabase<I> {
    /// Empty database owned by `owner`
    pub fn new(owner: I) -> Self {
        Self {
            owner,
            entries: BTreeMap::new(),
            version: 0,
        }
    }

    /// Offer a packet
    ///
    /// Installing bumps the version; rejections have no side effects.
    pub fn accept(&mut self, packet: LinkStatePacket<I>) -> AcceptOutcome {
        let incumbent = self.entries.get(&packet.source);
        match is_newer(&packet, incumbent) {
            Ok(true) => {
                debug!(
                    owner = %self.owner,
                    source = %packet.source,
                    seq = packet.sequence_number,
                    "installed packet"
                );
                self.entries.insert(packet.source.clone(), packet);
                self.version += 1;
                AcceptOutcome::Installed
            }
            Ok(false) => AcceptOutcome::Rejected(RejectReason::DuplicateOrStale),
            Err(error) => {
                warn!(owner = %self.owner, %error, "rejected corrupt packet");
                AcceptOutcome::Rejected(RejectReason::Corrupt(error))
            }
        }
    }

    /// Drop a source's entry
    pub fn remove(&mut self, source: &I) -> Option<LinkStatePacket<I>> {
        let removed = self.entries.remove(source);
        if removed.is_some() {
            self.version += 1;
            info!(owner = %self.owner, source = %source, "removed source from database");
        }
        removed
    }

    /// Consistent adjacency view at the current version
    pub fn snapshot_graph(&self) -> TopologySnapshot<I> {
        let graph = self
            .entries
            .iter()
            .map(|(source, packet)| (source.clone(), packet.neighbors.clone()))
            .collect();
        TopologySnapshot {
            version: self.version,
            graph,
        }
    }

    /// Age every foreign entry by `elapsed_ticks`; returns expired sources
    pub fn tick_age(&mut self, elapsed_ticks: u32) -> Vec<I> {
        let mut expired = Vec::new();
        for (source, packet) in self.entries.iter_mut() {
            if *source == self.owner {
                continue;
            }
            packet.age = packet.age.saturating_sub(elapsed_ticks);
            if packet.age == 0 {
                expired.push(source.clone());
            }
        }

        for source in &expired {
            self.remove(source);
        }
        expired
    }

    /// The owning node
    pub fn owner(&self) -> &I {
        &self.owner
    }

    /// Installed packet for a source
    pub fn get(&self, source: &I) -> Option<&LinkStatePacket<I>> {
        self.entries.get(source)
    }

    /// All installed packets in ascending source order
    pub fn entries(&self) -> impl Iterator<Item = &LinkStatePacket<I>> {
        self.entries.values()
    }

    /// source -> latest installed sequence number
    pub fn sequence_numbers(&self) -> BTreeMap<I, u64> {
        self.entries
            .iter()
            .map(|(source, packet)| (source.clone(), packet.sequence_number))
            .collect()
    }

    /// Bumped on every install and removal
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
