//! Transaction record types
//!
//! One record per reservation terminal transition, created at that moment
//! and never mutated afterwards. This is the audit trail.

use crate::{AgentId, Amount, RecordId, ReservationId, SpendCategory, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a reservation terminated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Funds captured (possibly partially)
    Confirmed { final_amount: Amount },
    /// Hold released by the caller
    Voided { reason: String },
    /// Hold lapsed without a terminal call
    Expired,
    /// Captured funds credited back after settlement
    Refunded {
        original: RecordId,
        amount: Amount,
    },
}

/// Immutable record of a terminalized reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Record ID
    pub id: RecordId,
    /// The reservation this record terminalizes
    pub reservation_id: ReservationId,
    /// Agent that authorized the purchase
    pub agent_id: AgentId,
    /// Wallet the funds moved through
    pub wallet_id: WalletId,
    /// Amount originally reserved
    pub reserved_amount: Amount,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Purchase category carried from authorization
    pub category: SpendCategory,
    /// External execution service, if the collaborator reported one
    pub external_service: Option<String>,
    /// Error code reported by the collaborator, if any
    pub error_code: Option<String>,
    /// When the terminal transition happened
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Amount that actually left the wallet, if any
    pub fn captured_amount(&self) -> Amount {
        match &self.outcome {
            Outcome::Confirmed { final_amount } => *final_amount,
            _ => Amount::zero(),
        }
    }
}
