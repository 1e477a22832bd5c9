//! Error types for the link-state simulator

use thiserror::Error;

/// Top-level error type for core operations
#[derive(Debug, Error)]
pub enum LinkStateError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Invalid cost: {0}")]
    Cost(#[from] CostError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors related to node identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid identity format: {0}")]
    InvalidFormat(String),

    #[error("Invalid identity length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A link cost that cannot enter an LSP
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CostError {
    #[error("link cost {0} is negative")]
    Negative(f64),

    #[error("link cost is not finite")]
    NonFinite,
}

/// Protocol violations detected while comparing link-state packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Same source and sequence number, different adjacency
    #[error("Corrupt packet from {source_id}: sequence {sequence_number} reused with different neighbors")]
    Corrupt {
        source_id: String,
        sequence_number: u64,
    },

    /// Comparison of packets from two different sources
    #[error("Source mismatch: {candidate} vs {incumbent}")]
    SourceMismatch { candidate: String, incumbent: String },
}

/// Errors related to transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),
}

/// Errors related to wire message handling
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::InvalidMessageFormat(e.to_string())
        } else {
            Self::Encoding(e.to_string())
        }
    }
}

/// Result type alias for core operations
pub type LinkStateResult<T> = Result<T, LinkStateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_error_display() {
        let err = CostError::Negative(-3.0);
        assert!(format!("{}", err).contains("-3"));
        assert!(format!("{}", CostError::NonFinite).contains("not finite"));
    }

    #[test]
    fn test_corrupt_packet_display() {
        let err = PacketError::Corrupt {
            source_id: "A".to_string(),
            sequence_number: 5,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("A"));
        assert!(msg.contains("5"));
    }

    #[test]
    fn test_protocol_error_from_json() {
        let err = serde_json::from_str::<u32>("{").unwrap_err();
        let protocol: ProtocolError = err.into();
        assert!(matches!(protocol, ProtocolError::InvalidMessageFormat(_)));
    }

    #[test]
    fn test_error_conversions() {
        let err: LinkStateError = IdentityError::InvalidFormat("x".into()).into();
        assert!(matches!(err, LinkStateError::Identity(_)));

        let err: LinkStateError = CostError::NonFinite.into();
        assert!(matches!(err, LinkStateError::Cost(_)));

        let err: LinkStateError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, LinkStateError::Transport(_)));

        let err: LinkStateError = ProtocolError::Encoding("boom".into()).into();
        assert!(format!("{}", err).contains("boom"));
    }
}
