//! Wire messages exchanged between nodes
//!
//! Messages are transport-agnostic. [`WireCodec`] turns them into JSON
//! frames; fields a peer does not know are ignored on decode.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::LinkCost;
use crate::error::ProtocolError;
use crate::identity::PeerIdentity;
use crate::packet::{LinkStatePacket, LspKey};
use crate::status::StatusSnapshot;

/// One route advertised in a distance vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct AdvertisedRoute<I: PeerIdentity> {
    /// Total cost from the advertiser to the destination
    pub cost: LinkCost,
    /// Path from the advertiser to the destination, inclusive
    pub path: Vec<I>,
}

/// A distance vector advertised to direct neighbors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct DistanceVector<I: PeerIdentity> {
    /// Advertising node
    pub source: I,
    /// Monotonically increasing per source
    pub sequence_number: u64,
    /// Destination -> best known route
    pub routes: BTreeMap<I, AdvertisedRoute<I>>,
    /// Wall-clock time of origination (diagnostics only)
    pub created_at: DateTime<Utc>,
}

/// A routing-protocol payload, independent of the algorithm hosting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingMessage<I: PeerIdentity> {
    /// Flooded link-state packet
    Lsp(LinkStatePacket<I>),
    /// Neighbor-scoped distance vector
    DistanceVector(DistanceVector<I>),
}

impl<I: PeerIdentity> RoutingMessage<I> {
    /// Key used for acknowledgments and duplicate suppression
    pub fn key(&self) -> LspKey<I> {
        match self {
            Self::Lsp(packet) => packet.key(),
            Self::DistanceVector(vector) => {
                LspKey::new(vector.source.clone(), vector.sequence_number)
            }
        }
    }

    /// Wrap into a wire message sent by `sender`
    pub fn into_wire(self, sender: I) -> WireMessage<I> {
        match self {
            Self::Lsp(packet) => WireMessage::LspFlood { sender, packet },
            Self::DistanceVector(vector) => WireMessage::DistanceVector { sender, vector },
        }
    }
}

/// Every message kind understood by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(bound = "I: PeerIdentity")]
pub enum WireMessage<I: PeerIdentity> {
    /// Carries one link-state packet
    LspFlood {
        sender: I,
        packet: LinkStatePacket<I>,
    },

    /// Carries one distance vector
    DistanceVector {
        sender: I,
        vector: DistanceVector<I>,
    },

    /// Acknowledges receipt in reliable mode
    Ack {
        source: I,
        sequence_number: u64,
        from: I,
    },

    /// Liveness probe
    Hello { from: I },

    /// Reply to a liveness probe
    HelloResponse { from: I, timestamp: DateTime<Utc> },

    /// Read-only introspection request
    StatusRequest { from: I },

    /// Introspection reply
    StatusResponse { status: StatusSnapshot<I> },
}

impl<I: PeerIdentity> WireMessage<I> {
    /// Extract the routing payload, if this message carries one
    pub fn into_routing(self) -> Option<(I, RoutingMessage<I>)> {
        match self {
            Self::LspFlood { sender, packet } => Some((sender, RoutingMessage::Lsp(packet))),
            Self::DistanceVector { sender, vector } => {
                Some((sender, RoutingMessage::DistanceVector(vector)))
            }
            _ => None,
        }
    }

    /// Build an acknowledgment for a routing key
    pub fn ack(key: &LspKey<I>, from: I) -> Self {
        Self::Ack {
            source: key.source.clone(),
            sequence_number: key.sequence_number,
            from,
        }
    }

    /// Short name of the message kind (for logging)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LspFlood { .. } => "LSP_FLOOD",
            Self::DistanceVector { .. } => "DISTANCE_VECTOR",
            Self::Ack { .. } => "ACK",
            Self::Hello { .. } => "HELLO",
            Self::HelloResponse { .. } => "HELLO_RESPONSE",
            Self::StatusRequest { .. } => "STATUS_REQUEST",
            Self::StatusResponse { .. } => "STATUS_RESPONSE",
        }
    }
}

/// JSON frame codec for [`WireMessage`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl WireCodec {
    /// Encode a message into a frame
    pub fn encode<I: PeerIdentity>(message: &WireMessage<I>) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(message)?)
    }

    /// Decode a frame into a message
    pub fn decode<I: PeerIdentity>(frame: &[u8]) -> Result<WireMessage<I>, ProtocolError> {
        Ok(serde_json::from_slice(frame)?)
    }
}
