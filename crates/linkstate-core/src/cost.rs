//! Link costs
//!
//! [`LinkCost`] is a validated, non-negative, finite metric. Validation
//! happens at construction and at deserialization, so no code path can
//! build an LSP that carries a negative or non-finite cost.

use std::cmp::Ordering;
use std::fmt::Display;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::CostError;

/// Cost of a directed link
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct LinkCost(f64);

impl LinkCost {
    /// Zero cost (a node's distance to itself)
    pub const ZERO: Self = Self(0.0);

    /// Largest representable cost; sums saturate here
    pub const MAX: Self = Self(f64::MAX);

    /// Create a cost, rejecting negative and non-finite values
    pub fn new(value: f64) -> Result<Self, CostError> {
        if !value.is_finite() {
            return Err(CostError::NonFinite);
        }
        if value < 0.0 {
            return Err(CostError::Negative(value));
        }
        // Normalize -0.0 so equal costs compare and serialize identically
        Ok(Self(value + 0.0))
    }

    /// Get the raw value
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for LinkCost {
    type Error = CostError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<u32> for LinkCost {
    type Error = CostError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(f64::from(value))
    }
}

impl From<LinkCost> for f64 {
    fn from(cost: LinkCost) -> Self {
        cost.0
    }
}

impl PartialEq for LinkCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LinkCost {}

impl PartialOrd for LinkCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LinkCost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add for LinkCost {
    type Output = LinkCost;

    fn add(self, rhs: Self) -> Self::Output {
        let sum = self.0 + rhs.0;
        if sum.is_finite() { Self(sum) } else { Self::MAX }
    }
}

impl Display for LinkCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.fract() == 0.0 && self.0 < 1e15 {
            write!(f, "{}", self.0 as u64)
        } else {
            write!(f, "{:.3}", self.0)
        }
    }
}
