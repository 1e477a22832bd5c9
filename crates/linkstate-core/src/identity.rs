//! Node identity abstractions
//!
//! This module provides the [`PeerIdentity`] trait that abstracts over
//! different identity implementations:
//!
//! - [`SimulationIdentity`]: Simple char-based identity ('A'..'Z')
//! - [`NamedIdentity`]: Free-form router names for larger configured topologies

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::IdentityError;

/// Trait for node identity abstraction
///
/// Identities are totally ordered: the shortest-path tie-break and every
/// rendered table walk identifiers in ascending order.
pub trait PeerIdentity:
    Clone + Eq + Ord + Hash + Send + Sync + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Get the identity as bytes
    fn as_bytes(&self) -> Vec<u8>;

    /// Create an identity from bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError>;

    /// Get a short display form (for logging)
    fn short_id(&self) -> String {
        format!("{}", self)
    }
}

/// Simple character-based identity for simulation
///
/// Maps to characters 'A'..'Z'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationIdentity(pub char);

impl SimulationIdentity {
    /// Create a new simulation identity from a capital letter
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_uppercase() {
            Some(Self(c))
        } else {
            None
        }
    }

    /// Generate all identities from 'A' to the given letter (inclusive)
    pub fn range_to(end: char) -> Vec<Self> {
        ('A'..=end).filter_map(Self::new).collect()
    }

    /// Get the underlying character
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl Display for SimulationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SimulationIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c).ok_or_else(|| {
                IdentityError::InvalidFormat(format!("Invalid simulation identity: {}", s))
            }),
            _ => Err(IdentityError::InvalidFormat(format!(
                "Invalid simulation identity: {}",
                s
            ))),
        }
    }
}

impl PeerIdentity for SimulationIdentity {
    fn as_bytes(&self) -> Vec<u8> {
        vec![self.0 as u8]
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != 1 {
            return Err(IdentityError::InvalidLength {
                expected: 1,
                actual: bytes.len(),
            });
        }
        let c = bytes[0] as char;
        Self::new(c).ok_or_else(|| {
            IdentityError::InvalidFormat(format!("Invalid simulation identity: {}", c))
        })
    }

    fn short_id(&self) -> String {
        self.0.to_string()
    }
}

/// Router name identity
///
/// Any non-empty name without whitespace, e.g. `"core-1"`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct NamedIdentity(String);

impl NamedIdentity {
    /// Create a named identity, validating the name
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(IdentityError::InvalidFormat(format!(
                "Invalid node name: {:?}",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Get the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for NamedIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl PeerIdentity for NamedIdentity {
    fn as_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let name = std::str::from_utf8(bytes)
            .map_err(|e| IdentityError::InvalidFormat(e.to_string()))?;
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_identity_creation() {
        assert!(SimulationIdentity::new('A').is_some());
        assert!(SimulationIdentity::new('Z').is_some());
        assert!(SimulationIdentity::new('a').is_none());
        assert!(SimulationIdentity::new('1').is_none());
    }

    #[test]
    fn test_simulation_identity_range() {
        let ids = SimulationIdentity::range_to('C');
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0].0, 'A');
        assert_eq!(ids[2].0, 'C');
    }

    #[test]
    fn test_simulation_identity_parse() {
        let id: SimulationIdentity = "H".parse().unwrap();
        assert_eq!(id.as_char(), 'H');
        assert!("HI".parse::<SimulationIdentity>().is_err());
        assert!("".parse::<SimulationIdentity>().is_err());
    }

    #[test]
    fn test_simulation_identity_bytes_roundtrip() {
        let id = SimulationIdentity::new('M').unwrap();
        let recovered = SimulationIdentity::from_bytes(&id.as_bytes()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_named_identity_validation() {
        assert!(NamedIdentity::new("core-1").is_ok());
        assert!(NamedIdentity::new("").is_err());
        assert!(NamedIdentity::new("edge 2").is_err());

        let id = NamedIdentity::new("core-1").unwrap();
        assert_eq!(id.to_string(), "core-1");
        assert_eq!(NamedIdentity::from_bytes(&id.as_bytes()).unwrap(), id);
    }

    #[test]
    fn test_identities_are_ordered() {
        let mut ids = vec![
            SimulationIdentity('C'),
            SimulationIdentity('A'),
            SimulationIdentity('B'),
        ];
        ids.sort();
        assert_eq!(ids, SimulationIdentity::range_to('C'));
    }
}
