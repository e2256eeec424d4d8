//! The authorization engine
//!
//! Decides, for each proposed purchase, whether an agent may proceed, and
//! walks every approved purchase through its lifecycle:
//!
//! ```text
//! authorize -> Pending -> confirm  -> Confirmed
//!                      -> void     -> Voided
//!                      -> (sweep)  -> Expired
//! ```
//!
//! Check ordering in `authorize` is deliberate: the cheap local window
//! admission runs before the contended ledger reserve, which requires the
//! compensating window void when the ledger refuses - otherwise a denied
//! purchase would leak phantom daily-limit consumption.
//!
//! Terminal transitions go through the store's compare-and-set, so a confirm
//! racing the expiry sweep resolves to exactly one winner; the loser reports
//! the terminal state it found instead of silently succeeding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use spendgate_audit::TransactionLog;
use spendgate_ledger::{CreditReason, FundsLedger};
use spendgate_store::Store;
use spendgate_types::{
    AgentConfigUpdate, AgentId, AgentProfile, Amount, Denial, Fault, Outcome, PurchaseMetadata,
    RecordId, Reservation, ReservationId, ReservationStatus, Result, SpendCategory, SpendError,
    TransactionRecord, Wallet, WalletId,
};
use spendgate_window::{AdmissionLimits, SpendWindowTracker};

use crate::config::EngineConfig;

/// What an agent has spent and may still spend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendSummary {
    pub agent_id: AgentId,
    pub daily_limit: Amount,
    pub spent_in_window: Amount,
    pub remaining: Amount,
    pub transaction_limit: Amount,
    pub velocity_limit: u32,
    pub by_category: HashMap<SpendCategory, Amount>,
    pub emergency_stopped: bool,
}

/// The Spendgate authorization engine
///
/// The only type the surrounding system talks to. Construction injects the
/// store and the transaction log; the funds ledger and the window tracker
/// are owned internally.
#[derive(Clone)]
pub struct AuthorizationEngine {
    store: Arc<dyn Store>,
    ledger: FundsLedger,
    window: SpendWindowTracker,
    log: Arc<dyn TransactionLog>,
    config: EngineConfig,
}

impl AuthorizationEngine {
    pub fn new(store: Arc<dyn Store>, log: Arc<dyn TransactionLog>, config: EngineConfig) -> Self {
        Self {
            ledger: FundsLedger::new(store.clone()),
            window: SpendWindowTracker::with_window(config.window()),
            store,
            log,
            config,
        }
    }

    /// The funds ledger (for wallet creation, funding, and trail queries)
    pub fn ledger(&self) -> &FundsLedger {
        &self.ledger
    }

    /// The transaction log (for audit queries)
    pub fn log(&self) -> &Arc<dyn TransactionLog> {
        &self.log
    }

    // ------------------------------------------------------------------
    // Wallet and agent administration
    // ------------------------------------------------------------------

    /// Create a new empty wallet
    pub async fn create_wallet(&self) -> Result<Wallet> {
        self.ledger.create_wallet().await
    }

    /// Credit owner funds into a wallet
    pub async fn fund_wallet(&self, wallet_id: &WalletId, amount: Amount) -> Result<Amount> {
        self.ledger.credit(wallet_id, amount, CreditReason::TopUp).await
    }

    /// Register an agent against an existing wallet
    pub async fn register_agent(
        &self,
        wallet_id: &WalletId,
        daily_limit: Amount,
    ) -> Result<AgentProfile> {
        // Fails early on a dangling wallet reference.
        self.store.wallet(wallet_id).await?;
        let agent = AgentProfile::new(*wallet_id, daily_limit);
        self.store.put_agent(agent.clone()).await?;
        info!("Agent {} registered on wallet {}", agent.id, wallet_id);
        Ok(agent)
    }

    /// Owner config-update call: adjust an agent's spending controls
    pub async fn update_agent_config(
        &self,
        agent_id: &AgentId,
        update: AgentConfigUpdate,
    ) -> Result<AgentProfile> {
        let mut agent = self.store.agent(agent_id).await?;
        agent.apply(update);
        self.store.put_agent(agent.clone()).await?;
        info!("Agent {} config updated", agent_id);
        Ok(agent)
    }

    /// Flip the agent's emergency stop
    pub async fn set_emergency_stop(&self, agent_id: &AgentId, enabled: bool) -> Result<()> {
        let mut agent = self.store.agent(agent_id).await?;
        agent.emergency_stopped = enabled;
        self.store.put_agent(agent).await?;
        if enabled {
            warn!("Emergency stop ENGAGED for agent {}", agent_id);
        } else {
            info!("Emergency stop cleared for agent {}", agent_id);
        }
        Ok(())
    }

    /// Permanently revoke an agent; its wallet persists
    pub async fn revoke_agent(&self, agent_id: &AgentId) -> Result<()> {
        let mut agent = self.store.agent(agent_id).await?;
        agent.revoked = true;
        self.store.put_agent(agent).await?;
        info!("Agent {} revoked", agent_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Authorization lifecycle
    // ------------------------------------------------------------------

    /// Decide a proposed purchase and, on approval, hold the funds
    pub async fn authorize(
        &self,
        agent_id: &AgentId,
        amount: Amount,
        metadata: PurchaseMetadata,
    ) -> Result<Reservation> {
        let now = Utc::now();
        let agent = self.store.agent(agent_id).await?;

        if agent.emergency_stopped {
            debug!("Authorization denied for {}: emergency stop", agent_id);
            return Err(Denial::EmergencyStopped.into());
        }
        if agent.revoked {
            debug!("Authorization denied for {}: revoked", agent_id);
            return Err(Denial::AgentRevoked.into());
        }
        if amount.is_zero() {
            return Err(Denial::InvalidAmount.into());
        }

        let limits = AdmissionLimits::from(&agent);
        let entry = self
            .window
            .try_admit(agent_id, amount, metadata.category, &limits, now)
            .await?;

        // Compensating void: a window admission must not outlive a refused
        // ledger hold.
        if let Err(err) = self.ledger.reserve(&agent.wallet_id, amount).await {
            self.window.void(agent_id, entry).await;
            return Err(err);
        }

        let reservation = Reservation {
            id: ReservationId::new(),
            agent_id: *agent_id,
            wallet_id: agent.wallet_id,
            amount,
            metadata,
            window_entry: entry,
            status: ReservationStatus::Pending,
            created_at: now,
            expires_at: now + self.config.reservation_ttl(),
        };

        if let Err(err) = self.store.put_reservation(reservation.clone()).await {
            // Storage refused the row: unwind both side effects.
            let _ = self.ledger.release(&agent.wallet_id, amount).await;
            self.window.void(agent_id, entry).await;
            return Err(err);
        }

        info!(
            "Reservation {} approved: agent {} holds {} until {}",
            reservation.id, agent_id, amount, reservation.expires_at
        );
        Ok(reservation)
    }

    /// Commit a pending reservation, capturing `final_amount` (defaults to
    /// the reserved amount) and releasing any excess
    ///
    /// Idempotent: re-confirming with the same final amount returns the
    /// original record.
    pub async fn confirm(
        &self,
        reservation_id: &ReservationId,
        final_amount: Option<Amount>,
    ) -> Result<TransactionRecord> {
        let now = Utc::now();
        let reservation = self.store.reservation(reservation_id).await?;
        let requested = final_amount.unwrap_or(reservation.amount);

        match reservation.status {
            ReservationStatus::Confirmed => self.replay_confirm(&reservation, requested).await,
            ReservationStatus::Voided => Err(Fault::InvalidTransition {
                reservation_id: reservation_id.to_string(),
                from: ReservationStatus::Voided,
                to: ReservationStatus::Confirmed,
            }
            .into()),
            ReservationStatus::Expired => Err(Denial::ReservationExpired {
                reservation_id: reservation_id.to_string(),
            }
            .into()),
            ReservationStatus::Pending => {
                if reservation.is_expired(now) {
                    // Lazily terminalize instead of waiting for the sweep;
                    // the CAS inside keeps this to one record.
                    self.expire(&reservation).await;
                    return Err(Denial::ReservationExpired {
                        reservation_id: reservation_id.to_string(),
                    }
                    .into());
                }
                if requested.is_zero() {
                    return Err(Denial::InvalidAmount.into());
                }
                if requested > reservation.amount {
                    return Err(Denial::AmountExceedsReservation {
                        requested,
                        reserved: reservation.amount,
                    }
                    .into());
                }
                self.commit_confirm(&reservation, requested).await
            }
        }
    }

    /// Release a pending reservation without spending
    ///
    /// Idempotent: re-voiding returns the original record. Voiding a
    /// reservation the sweep already expired returns the expiry record -
    /// either way the hold is gone.
    pub async fn void(
        &self,
        reservation_id: &ReservationId,
        reason: &str,
    ) -> Result<TransactionRecord> {
        let reservation = self.store.reservation(reservation_id).await?;

        match reservation.status {
            ReservationStatus::Voided | ReservationStatus::Expired => {
                self.existing_record(reservation_id).await
            }
            ReservationStatus::Confirmed => Err(Fault::InvalidTransition {
                reservation_id: reservation_id.to_string(),
                from: ReservationStatus::Confirmed,
                to: ReservationStatus::Voided,
            }
            .into()),
            ReservationStatus::Pending => {
                match self
                    .store
                    .transition_reservation(
                        reservation_id,
                        ReservationStatus::Pending,
                        ReservationStatus::Voided,
                    )
                    .await
                {
                    Ok(_) => {}
                    Err(err) => return self.lost_void_race(reservation_id, err).await,
                }

                self.ledger
                    .release(&reservation.wallet_id, reservation.amount)
                    .await?;
                self.window
                    .void(&reservation.agent_id, reservation.window_entry)
                    .await;

                let record = self
                    .append_record(
                        &reservation,
                        Outcome::Voided {
                            reason: reason.to_string(),
                        },
                    )
                    .await?;
                info!(
                    "Reservation {} voided ({}): {} released",
                    reservation_id, reason, reservation.amount
                );
                Ok(record)
            }
        }
    }

    /// Expire every pending reservation past its TTL
    ///
    /// Time-driven: invoked by an external scheduler, not by request
    /// handlers. Safe to run concurrently with in-flight confirms - the
    /// status CAS picks one winner per reservation.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<TransactionRecord>> {
        let stale = self.store.expired_pending(now).await?;
        let mut records = Vec::new();
        for reservation in stale {
            if let Some(record) = self.expire(&reservation).await {
                records.push(record);
            }
        }
        if !records.is_empty() {
            info!("Expiry sweep released {} reservations", records.len());
        }
        Ok(records)
    }

    /// Current window usage for an agent
    pub async fn get_spend_summary(&self, agent_id: &AgentId) -> Result<SpendSummary> {
        let now = Utc::now();
        let agent = self.store.agent(agent_id).await?;
        let spent = self.window.current_spend(agent_id, now).await;
        Ok(SpendSummary {
            agent_id: *agent_id,
            daily_limit: agent.daily_limit,
            spent_in_window: spent,
            remaining: agent.daily_limit.saturating_sub(spent),
            transaction_limit: agent.transaction_limit,
            velocity_limit: agent.velocity_limit,
            by_category: self.window.spend_by_category(agent_id, now).await,
            emergency_stopped: agent.emergency_stopped,
        })
    }

    /// Credit captured funds back to the wallet after settlement
    ///
    /// Refunds restore the balance but not the spend window: same-day
    /// budget stays consumed, so an agent cannot launder its daily limit
    /// through refund cycles.
    pub async fn refund(
        &self,
        record_id: &RecordId,
        amount: Option<Amount>,
    ) -> Result<TransactionRecord> {
        let original = self.log.get(record_id).await?;
        let captured = match original.outcome {
            Outcome::Confirmed { final_amount } => final_amount,
            _ => {
                return Err(Fault::RecordNotFound {
                    record_id: format!("{record_id} is not a confirmed purchase"),
                }
                .into())
            }
        };

        // Cumulative refunds are capped at the captured amount; each record
        // can only give back what it took.
        let already_refunded = self.log.refunded_total(record_id).await?;
        let refundable = captured.saturating_sub(already_refunded);

        let amount = amount.unwrap_or(refundable);
        if amount.is_zero() {
            return Err(Denial::InvalidAmount.into());
        }
        if amount > refundable {
            return Err(Denial::AmountExceedsReservation {
                requested: amount,
                reserved: refundable,
            }
            .into());
        }

        self.ledger
            .credit(
                &original.wallet_id,
                amount,
                CreditReason::Refund {
                    record_id: *record_id,
                },
            )
            .await?;

        let refund = TransactionRecord {
            id: RecordId::new(),
            reservation_id: original.reservation_id,
            agent_id: original.agent_id,
            wallet_id: original.wallet_id,
            reserved_amount: original.reserved_amount,
            outcome: Outcome::Refunded {
                original: *record_id,
                amount,
            },
            category: original.category,
            external_service: original.external_service.clone(),
            error_code: None,
            recorded_at: Utc::now(),
        };
        let chained = self.log.append(refund).await?;
        info!("Record {} refunded {}", record_id, amount);
        Ok(chained.record)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn commit_confirm(
        &self,
        reservation: &Reservation,
        final_amount: Amount,
    ) -> Result<TransactionRecord> {
        match self
            .store
            .transition_reservation(
                &reservation.id,
                ReservationStatus::Pending,
                ReservationStatus::Confirmed,
            )
            .await
        {
            Ok(_) => {}
            Err(SpendError::Fault(Fault::InvalidTransition { from, .. })) => {
                // Lost the race against a sweep or another confirm.
                return match from {
                    ReservationStatus::Expired => Err(Denial::ReservationExpired {
                        reservation_id: reservation.id.to_string(),
                    }
                    .into()),
                    ReservationStatus::Confirmed => {
                        self.replay_confirm(reservation, final_amount).await
                    }
                    status => Err(Fault::InvalidTransition {
                        reservation_id: reservation.id.to_string(),
                        from: status,
                        to: ReservationStatus::Confirmed,
                    }
                    .into()),
                };
            }
            Err(err) => return Err(err),
        }

        self.ledger
            .capture(&reservation.wallet_id, final_amount)
            .await?;
        let excess = reservation.amount.saturating_sub(final_amount);
        if !excess.is_zero() {
            self.ledger.release(&reservation.wallet_id, excess).await?;
        }
        self.window
            .commit(&reservation.agent_id, reservation.window_entry, final_amount)
            .await;

        let record = self
            .append_record(reservation, Outcome::Confirmed { final_amount })
            .await?;
        info!(
            "Reservation {} confirmed: captured {}, released {}",
            reservation.id, final_amount, excess
        );
        Ok(record)
    }

    /// Idempotent re-confirm: same amount replays the original record,
    /// anything else is a duplicate terminalization attempt
    async fn replay_confirm(
        &self,
        reservation: &Reservation,
        requested: Amount,
    ) -> Result<TransactionRecord> {
        let record = self.existing_record(&reservation.id).await?;
        if record.captured_amount() == requested {
            return Ok(record);
        }
        Err(Fault::DuplicateRecord {
            reservation_id: reservation.id.to_string(),
        }
        .into())
    }

    async fn lost_void_race(
        &self,
        reservation_id: &ReservationId,
        err: SpendError,
    ) -> Result<TransactionRecord> {
        match err {
            SpendError::Fault(Fault::InvalidTransition {
                from: ReservationStatus::Voided | ReservationStatus::Expired,
                ..
            }) => self.existing_record(reservation_id).await,
            other => Err(other),
        }
    }

    /// Terminalize an expired pending reservation; `None` when another
    /// caller got there first
    async fn expire(&self, reservation: &Reservation) -> Option<TransactionRecord> {
        match self
            .store
            .transition_reservation(
                &reservation.id,
                ReservationStatus::Pending,
                ReservationStatus::Expired,
            )
            .await
        {
            Ok(_) => {}
            Err(_) => return None,
        }

        if let Err(err) = self
            .ledger
            .release(&reservation.wallet_id, reservation.amount)
            .await
        {
            warn!(
                "Failed to release expired reservation {}: {}",
                reservation.id, err
            );
        }
        self.window
            .void(&reservation.agent_id, reservation.window_entry)
            .await;

        match self.append_record(reservation, Outcome::Expired).await {
            Ok(record) => {
                info!("Reservation {} expired", reservation.id);
                Some(record)
            }
            Err(err) => {
                warn!(
                    "Failed to record expiry for reservation {}: {}",
                    reservation.id, err
                );
                None
            }
        }
    }

    async fn existing_record(&self, reservation_id: &ReservationId) -> Result<TransactionRecord> {
        self.log
            .for_reservation(reservation_id)
            .await?
            .ok_or_else(|| {
                // Terminal status without a record: the winner is still
                // mid-write; the caller may retry.
                Fault::Storage {
                    message: format!(
                        "record for reservation {reservation_id} not yet visible"
                    ),
                }
                .into()
            })
    }

    async fn append_record(
        &self,
        reservation: &Reservation,
        outcome: Outcome,
    ) -> Result<TransactionRecord> {
        let record = TransactionRecord {
            id: RecordId::new(),
            reservation_id: reservation.id,
            agent_id: reservation.agent_id,
            wallet_id: reservation.wallet_id,
            reserved_amount: reservation.amount,
            outcome,
            category: reservation.metadata.category,
            external_service: reservation.metadata.external_service.clone(),
            error_code: None,
            recorded_at: Utc::now(),
        };
        Ok(self.log.append(record).await?.record)
    }
}
