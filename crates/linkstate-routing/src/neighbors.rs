//! Directly configured adjacencies
//!
//! The [`NeighborSet`] is a node's local ground truth. Mutating it is the
//! only legitimate reason to originate a new self-advertisement out of
//! cycle, so [`NeighborSet::apply`] reports whether anything changed.

use std::collections::BTreeMap;

use linkstate_core::{LinkCost, PeerIdentity};
use tracing::debug;

use crate::error::{RoutingError, RoutingResult};

/// A requested adjacency mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborChange<I: PeerIdentity> {
    /// Add a neighbor (or re-cost it if already present)
    Add { neighbor: I, cost: LinkCost },
    /// Remove a neighbor
    Remove { neighbor: I },
    /// Change the cost of an existing neighbor
    SetCost { neighbor: I, cost: LinkCost },
}

impl<I: PeerIdentity> NeighborChange<I> {
    /// Add with a raw cost, validated here
    pub fn add(neighbor: I, cost: f64) -> RoutingResult<Self> {
        Ok(Self::Add {
            neighbor,
            cost: LinkCost::new(cost)?,
        })
    }

    /// Re-cost with a raw cost, validated here
    pub fn set_cost(neighbor: I, cost: f64) -> RoutingResult<Self> {
        Ok(Self::SetCost {
            neighbor,
            cost: LinkCost::new(cost)?,
        })
    }

    /// Remove a neighbor
    pub fn remove(neighbor: I) -> Self {
        Self::Remove { neighbor }
    }

    /// The neighbor this change targets
    pub fn neighbor(&self) -> &I {
        match self {
            Self::Add { neighbor, .. } | Self::Remove { neighbor } | Self::SetCost { neighbor, .. } => {
                neighbor
            }
        }
    }
}

/// A node's directly configured neighbors and link costs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSet<I: PeerIdentity> {
    owner: I,
    links: BTreeMap<I, LinkCost>,
}

impl<I: PeerIdentity> NeighborSet<I> {
    /// Empty neighbor set owned by `owner`
    pub fn new(owner: I) -> Self {
        Self {
            owner,
            links: BTreeMap::new(),
        }
    }

    /// Build from configured links, rejecting self-loops
    pub fn with_neighbors(
        owner: I,
        links: impl IntoIterator<Item = (I, LinkCost)>,
    ) -> RoutingResult<Self> {
        let mut set = Self::new(owner);
        for (neighbor, cost) in links {
            set.apply(NeighborChange::Add { neighbor, cost })?;
        }
        Ok(set)
    }

    /// Apply a change; returns `true` if the adjacency actually changed
    pub fn apply(&mut self, change: NeighborChange<I>) -> RoutingResult<bool> {
        if change.neighbor() == &self.owner {
            return Err(RoutingError::SelfLoop(self.owner.short_id()));
        }

        let changed = match change {
            NeighborChange::Add { neighbor, cost } => {
                self.links.insert(neighbor, cost) != Some(cost)
            }
            NeighborChange::Remove { neighbor } => self.links.remove(&neighbor).is_some(),
            NeighborChange::SetCost { neighbor, cost } => {
                let Some(current) = self.links.get_mut(&neighbor) else {
                    return Err(RoutingError::UnknownNeighbor(neighbor.short_id()));
                };
                let changed = *current != cost;
                *current = cost;
                changed
            }
        };

        if changed {
            debug!(owner = %self.owner, neighbors = self.links.len(), "neighbor set changed");
        }
        Ok(changed)
    }

    /// The owning node
    pub fn owner(&self) -> &I {
        &self.owner
    }

    /// Cost to a neighbor
    pub fn cost_to(&self, neighbor: &I) -> Option<LinkCost> {
        self.links.get(neighbor).copied()
    }

    /// Whether `neighbor` is configured
    pub fn contains(&self, neighbor: &I) -> bool {
        self.links.contains_key(neighbor)
    }

    /// Neighbor ids in ascending order
    pub fn ids(&self) -> Vec<I> {
        self.links.keys().cloned().collect()
    }

    /// Neighbor ids in ascending order, skipping one
    pub fn ids_except(&self, excluded: &I) -> Vec<I> {
        self.links
            .keys()
            .filter(|id| *id != excluded)
            .cloned()
            .collect()
    }

    /// Iterate `(neighbor, cost)` in ascending neighbor order
    pub fn iter(&self) -> impl Iterator<Item = (&I, &LinkCost)> {
        self.links.iter()
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &BTreeMap<I, LinkCost> {
        &self.links
    }

    /// Number of neighbors
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the node has no neighbors
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
