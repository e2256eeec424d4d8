//! Spendgate Ledger - the single source of truth for wallet funds
//!
//! The ledger is:
//! - Minor-unit integer only (no floating point near money)
//! - Overdraft-proof (`reserve` is the only path that creates a hold, and it
//!   checks `balance - reserved` first)
//! - Per-wallet serialized (no two operations on one wallet interleave)
//! - Trailed (every mutation appends an immutable entry)
//!
//! # Invariants
//!
//! 1. `0 <= reserved <= balance` for every wallet, always
//! 2. `capture`/`release` never exceed the outstanding hold; a caller that
//!    tries indicates an ordering bug and gets `InvariantViolation`
//! 3. Entries are append-only

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use spendgate_store::{KeyedLocks, Store};
use spendgate_types::{
    Amount, Denial, EntryId, Fault, RecordId, Result, Wallet, WalletId, WalletStatus,
};

/// Why funds were credited to a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditReason {
    /// Owner funded the wallet
    TopUp,
    /// Captured funds returned after settlement
    Refund { record_id: RecordId },
}

/// What a ledger entry did to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Balance increased
    Credit { reason: CreditReason },
    /// Reservation placed a hold (reserved increased)
    Hold,
    /// Hold committed (balance and reserved both decreased)
    Capture,
    /// Hold released (reserved decreased, balance untouched)
    Release,
}

/// One immutable line in the funds trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub wallet_id: WalletId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub balance_after: Amount,
    pub reserved_after: Amount,
    pub created_at: DateTime<Utc>,
}

/// The Spendgate funds ledger
///
/// Wallet rows live behind the injected [`Store`]; the entry trail is kept
/// here. All four mutations run under a per-wallet lock.
#[derive(Clone)]
pub struct FundsLedger {
    store: Arc<dyn Store>,
    locks: Arc<KeyedLocks<WalletId>>,
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl FundsLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create and persist a new empty wallet
    pub async fn create_wallet(&self) -> Result<Wallet> {
        let wallet = Wallet::new();
        self.store.put_wallet(wallet.clone()).await?;
        info!("Wallet {} created", wallet.id);
        Ok(wallet)
    }

    /// Fetch the current wallet state
    pub async fn wallet(&self, wallet_id: &WalletId) -> Result<Wallet> {
        self.store.wallet(wallet_id).await
    }

    /// Increase a wallet's balance
    pub async fn credit(
        &self,
        wallet_id: &WalletId,
        amount: Amount,
        reason: CreditReason,
    ) -> Result<Amount> {
        if amount.is_zero() {
            return Err(Denial::InvalidAmount.into());
        }

        let _guard = self.locks.acquire(wallet_id).await;
        let mut wallet = self.store.wallet(wallet_id).await?;

        wallet.balance = wallet.balance.checked_add(amount).ok_or_else(|| {
            Fault::InvariantViolation {
                message: format!("balance overflow crediting wallet {wallet_id}"),
            }
        })?;

        self.append(&wallet, EntryKind::Credit { reason }, amount)
            .await;
        let balance = wallet.balance;
        self.store.put_wallet(wallet).await?;
        info!("Wallet {} credited {} (balance {})", wallet_id, amount, balance);
        Ok(balance)
    }

    /// Place a hold: atomically check `balance - reserved >= amount` and
    /// increase `reserved`
    ///
    /// This is the only path that creates a hold. Returns the available
    /// funds left after the hold.
    pub async fn reserve(&self, wallet_id: &WalletId, amount: Amount) -> Result<Amount> {
        if amount.is_zero() {
            return Err(Denial::InvalidAmount.into());
        }

        let _guard = self.locks.acquire(wallet_id).await;
        let mut wallet = self.store.wallet(wallet_id).await?;

        if wallet.status != WalletStatus::Active {
            debug!("Reserve denied: wallet {} is {:?}", wallet_id, wallet.status);
            return Err(Denial::InsufficientFunds {
                available: Amount::zero(),
                requested: amount,
            }
            .into());
        }

        let available = wallet.available();
        if available < amount {
            debug!(
                "Reserve denied: wallet {} has {} available, {} requested",
                wallet_id, available, amount
            );
            return Err(Denial::InsufficientFunds {
                available,
                requested: amount,
            }
            .into());
        }

        // available >= amount implies reserved + amount <= balance <= u64::MAX
        wallet.reserved = wallet
            .reserved
            .checked_add(amount)
            .ok_or_else(|| Fault::InvariantViolation {
                message: format!("reserved overflow on wallet {wallet_id}"),
            })?;

        self.append(&wallet, EntryKind::Hold, amount).await;
        let available = wallet.available();
        self.store.put_wallet(wallet).await?;
        Ok(available)
    }

    /// Commit a hold: funds leave the wallet permanently
    pub async fn capture(&self, wallet_id: &WalletId, amount: Amount) -> Result<Amount> {
        let _guard = self.locks.acquire(wallet_id).await;
        let mut wallet = self.store.wallet(wallet_id).await?;

        wallet.reserved = self.take_from_hold(&wallet, amount, "capture")?;
        wallet.balance = wallet.balance.checked_sub(amount).ok_or_else(|| {
            // reserved <= balance makes this unreachable; if it fires, the
            // invariant is already broken.
            self.invariant_broken(wallet_id, "capture exceeds balance")
        })?;

        self.append(&wallet, EntryKind::Capture, amount).await;
        let balance = wallet.balance;
        self.store.put_wallet(wallet).await?;
        info!("Wallet {} captured {} (balance {})", wallet_id, amount, balance);
        Ok(balance)
    }

    /// Release a hold: funds return to the available pool
    pub async fn release(&self, wallet_id: &WalletId, amount: Amount) -> Result<Amount> {
        if amount.is_zero() {
            // Releasing nothing is a no-op (partial capture of the full
            // reserved amount releases an excess of zero).
            return Ok(self.store.wallet(wallet_id).await?.available());
        }

        let _guard = self.locks.acquire(wallet_id).await;
        let mut wallet = self.store.wallet(wallet_id).await?;

        wallet.reserved = self.take_from_hold(&wallet, amount, "release")?;

        self.append(&wallet, EntryKind::Release, amount).await;
        let available = wallet.available();
        self.store.put_wallet(wallet).await?;
        Ok(available)
    }

    /// All trail entries for a wallet, oldest first
    pub async fn entries_for_wallet(&self, wallet_id: &WalletId) -> Vec<LedgerEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| &e.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    /// Total number of trail entries
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    fn take_from_hold(&self, wallet: &Wallet, amount: Amount, op: &str) -> Result<Amount> {
        wallet
            .reserved
            .checked_sub(amount)
            .ok_or_else(|| self.invariant_broken(&wallet.id, &format!("{op} exceeds hold")))
            .map_err(Into::into)
    }

    fn invariant_broken(&self, wallet_id: &WalletId, message: &str) -> Fault {
        error!("Ledger invariant violated on wallet {}: {}", wallet_id, message);
        Fault::InvariantViolation {
            message: format!("wallet {wallet_id}: {message}"),
        }
    }

    async fn append(&self, wallet: &Wallet, kind: EntryKind, amount: Amount) {
        let entry = LedgerEntry {
            id: EntryId::new(),
            wallet_id: wallet.id,
            kind,
            amount,
            balance_after: wallet.balance,
            reserved_after: wallet.reserved,
            created_at: Utc::now(),
        };
        self.entries.write().await.push(entry);
    }
}
