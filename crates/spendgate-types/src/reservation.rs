//! Reservation lifecycle types
//!
//! A reservation is a time-bounded hold against wallet funds and the agent's
//! window budget, pending a final outcome. It transitions exactly once:
//! `Pending -> Confirmed` xor `Pending -> Voided` xor `Pending -> Expired`.

use crate::{AgentId, Amount, ReservationId, SpendCategory, WalletId, WindowEntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Voided,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Caller-supplied context for a purchase, fixed at authorization time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseMetadata {
    /// Explicit purchase category (never inferred later)
    pub category: SpendCategory,
    /// Human-readable description of the purchase
    pub description: String,
    /// Identifier of the external execution service, if known up front
    pub external_service: Option<String>,
}

/// A hold on funds awaiting confirm / void / expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Opaque reservation token
    pub id: ReservationId,
    /// The agent that authorized the purchase
    pub agent_id: AgentId,
    /// The wallet the hold was placed on
    pub wallet_id: WalletId,
    /// Amount held, in minor units
    pub amount: Amount,
    /// Purchase context
    pub metadata: PurchaseMetadata,
    /// The provisional spend-window entry backing this reservation
    pub window_entry: WindowEntryId,
    /// Current status
    pub status: ReservationStatus,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When the hold lapses if neither confirmed nor voided
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Voided.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }
}
