//! Link-state packets
//!
//! A [`LinkStatePacket`] is one node's advertised adjacency at one point in
//! time. Packets are immutable values: a node announces a change by
//! originating a new packet with a higher sequence number.
//!
//! ## Freshness
//!
//! The sequence number is the sole authority for "newer". The `age` and
//! `created_at` fields never override it; see [`is_newer`].

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::LinkCost;
use crate::error::PacketError;
use crate::identity::PeerIdentity;

/// Default remaining lifetime of a freshly originated packet, in age ticks
pub const DEFAULT_MAX_AGE: u32 = 60;

/// Identifies one logical update: a source and one of its sequence numbers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct LspKey<I: PeerIdentity> {
    /// Originating node
    pub source: I,
    /// Sequence number from the source
    pub sequence_number: u64,
}

impl<I: PeerIdentity> LspKey<I> {
    /// Create a new key
    pub fn new(source: I, sequence_number: u64) -> Self {
        Self {
            source,
            sequence_number,
        }
    }
}

impl<I: PeerIdentity> Display for LspKey<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.source, self.sequence_number)
    }
}

/// A link-state packet
///
/// Unknown fields are ignored on decode so that peers running a newer
/// revision of the protocol can still interoperate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct LinkStatePacket<I: PeerIdentity> {
    /// Node that originated this packet
    pub source: I,
    /// Monotonically increasing per source
    pub sequence_number: u64,
    /// Remaining lifetime in age ticks
    pub age: u32,
    /// Advertised adjacency: neighbor -> cost
    pub neighbors: BTreeMap<I, LinkCost>,
    /// Wall-clock time of origination (diagnostics only)
    pub created_at: DateTime<Utc>,
}

impl<I: PeerIdentity> LinkStatePacket<I> {
    /// Originate a new packet stamped with the current time
    pub fn originate(
        source: I,
        sequence_number: u64,
        age: u32,
        neighbors: BTreeMap<I, LinkCost>,
    ) -> Self {
        Self {
            source,
            sequence_number,
            age,
            neighbors,
            created_at: Utc::now(),
        }
    }

    /// The `(source, sequence_number)` key of this packet
    pub fn key(&self) -> LspKey<I> {
        LspKey::new(self.source.clone(), self.sequence_number)
    }

    /// Check whether this packet supersedes `incumbent`
    pub fn is_newer_than(&self, incumbent: Option<&Self>) -> Result<bool, PacketError> {
        is_newer(self, incumbent)
    }

    /// Cost to a neighbor, if advertised
    pub fn cost_to(&self, neighbor: &I) -> Option<LinkCost> {
        self.neighbors.get(neighbor).copied()
    }
}

/// Decide whether `candidate` supersedes `incumbent`
///
/// - No incumbent: the candidate is newer.
/// - Strictly greater sequence number wins.
/// - Equal sequence numbers with different neighbor sets is a protocol
///   violation and fails with [`PacketError::Corrupt`].
pub fn is_newer<I: PeerIdentity>(
    candidate: &LinkStatePacket<I>,
    incumbent: Option<&LinkStatePacket<I>>,
) -> Result<bool, PacketError> {
    let Some(incumbent) = incumbent else {
        return Ok(true);
    };

    if candidate.source != incumbent.source {
        return Err(PacketError::SourceMismatch {
            candidate: candidate.source.short_id(),
            incumbent: incumbent.source.short_id(),
        });
    }

    if candidate.sequence_number == incumbent.sequence_number
        && candidate.neighbors != incumbent.neighbors
    {
        return Err(PacketError::Corrupt {
            source_id: candidate.source.short_id(),
            sequence_number: candidate.sequence_number,
        });
    }

    Ok(candidate.sequence_number > incumbent.sequence_number)
}
