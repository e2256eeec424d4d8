//! Error taxonomy for Spendgate
//!
//! Two classes, deliberately kept apart:
//!
//! - [`Denial`]: a business rule refused the purchase. Returned to the caller
//!   for display, never retried automatically, never logged as an error.
//! - [`Fault`]: something is wrong with the system or the caller's discipline
//!   (unknown IDs, broken invariants, storage failure). Logged; only storage
//!   faults are candidates for caller-side retry with backoff.

use crate::{Amount, ReservationStatus};
use thiserror::Error;

/// Result type for Spendgate operations
pub type Result<T> = std::result::Result<T, SpendError>;

/// A business-rule refusal (a user-facing outcome, not a failure)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Amount,
        requested: Amount,
    },

    #[error("Daily limit exceeded: {remaining} remaining in the current window")]
    DailyLimitExceeded { remaining: Amount },

    #[error("Transaction limit exceeded: maximum {limit} per purchase")]
    TransactionLimitExceeded { limit: Amount },

    #[error("Category limit exceeded for {category}: {remaining} remaining")]
    CategoryLimitExceeded {
        category: String,
        remaining: Amount,
    },

    #[error("Velocity limit exceeded: maximum {limit} authorizations per hour")]
    VelocityLimitExceeded { limit: u32 },

    #[error("Emergency stop is active; all purchases are disabled")]
    EmergencyStopped,

    #[error("Agent has been revoked")]
    AgentRevoked,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Reservation {reservation_id} has expired")]
    ReservationExpired { reservation_id: String },

    #[error("Final amount {requested} exceeds reserved {reserved}")]
    AmountExceedsReservation {
        requested: Amount,
        reserved: Amount,
    },
}

/// A systemic failure or caller-discipline bug
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("Wallet {wallet_id} not found")]
    WalletNotFound { wallet_id: String },

    #[error("Agent {agent_id} not found")]
    AgentNotFound { agent_id: String },

    #[error("Reservation {reservation_id} not found")]
    ReservationNotFound { reservation_id: String },

    #[error("Transaction record {record_id} not found")]
    RecordNotFound { record_id: String },

    #[error("Invalid transition for reservation {reservation_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        reservation_id: String,
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Ledger invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Duplicate transaction record for reservation {reservation_id}")]
    DuplicateRecord { reservation_id: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

/// Top-level Spendgate error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpendError {
    #[error(transparent)]
    Denied(#[from] Denial),

    #[error(transparent)]
    Fault(#[from] Fault),
}

impl SpendError {
    /// True when this is an expected business refusal
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}
