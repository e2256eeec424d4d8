//! Minor-unit amount type
//!
//! All money in Spendgate is an unsigned integer count of minor units
//! (cents, satoshis). No floating point anywhere near a balance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// An amount in minor currency units (e.g. cents)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub u64);

impl Amount {
    pub fn new(minor_units: u64) -> Self {
        Self(minor_units)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Subtract, clamping at zero. Used for "remaining budget" diagnostics
    /// where a window already over its limit should report zero, not error.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).sum())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display as major units with 2 decimal places (assuming cents)
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
