//! Wallet types

use crate::{Amount, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a wallet
///
/// Wallets are never hard-deleted; closing one only flips the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
}

/// A pre-funded wallet
///
/// Invariant: `0 <= reserved <= balance` at all times. Only ledger
/// operations mutate a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet ID
    pub id: WalletId,
    /// Total funds in minor units, including reserved
    pub balance: Amount,
    /// Funds currently held by open reservations
    pub reserved: Amount,
    /// Lifecycle status
    pub status: WalletStatus,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new empty, active wallet
    pub fn new() -> Self {
        Self {
            id: WalletId::new(),
            balance: Amount::zero(),
            reserved: Amount::zero(),
            status: WalletStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Funds not held by any reservation
    pub fn available(&self) -> Amount {
        // reserved <= balance is a ledger invariant, so this never saturates
        // in practice; saturating keeps the accessor total anyway.
        self.balance.saturating_sub(self.reserved)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
