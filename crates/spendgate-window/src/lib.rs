//! Spendgate Window - rolling spend-window tracking and admission
//!
//! Answers "how much has this agent spent in the trailing window" and admits
//! or denies new spend against the agent's limits. Admission appends a
//! *provisional* entry that backs the reservation; the entry is finalized on
//! confirm and removed on void, so an abandoned purchase never consumes
//! budget.
//!
//! Entries older than the window are pruned lazily on read. Pruning mutates
//! stored state on purpose: it bounds memory and keeps later queries cheap.
//!
//! Admissions for one agent are serialized through a per-agent lock. Two
//! requests racing under the limit must not both pass the check when their
//! combined amount would exceed it - the classic check-then-act bug this
//! ordering closes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use spendgate_store::KeyedLocks;
use spendgate_types::{
    AgentId, AgentProfile, Amount, Denial, Result, SpendCategory, WindowEntryId,
};

/// Limits evaluated during admission, snapshotted from the agent profile
#[derive(Debug, Clone)]
pub struct AdmissionLimits {
    pub daily_limit: Amount,
    pub transaction_limit: Amount,
    pub velocity_limit: u32,
    pub category_limits: HashMap<SpendCategory, Amount>,
}

impl From<&AgentProfile> for AdmissionLimits {
    fn from(profile: &AgentProfile) -> Self {
        Self {
            daily_limit: profile.daily_limit,
            transaction_limit: profile.transaction_limit,
            velocity_limit: profile.velocity_limit,
            category_limits: profile.category_limits.clone(),
        }
    }
}

/// One spend entry inside an agent's window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowEntry {
    pub id: WindowEntryId,
    pub at: DateTime<Utc>,
    pub amount: Amount,
    pub category: SpendCategory,
    /// Still backing an open reservation (not yet guaranteed committed)
    pub provisional: bool,
}

/// Per-agent rolling accumulator of spend entries
#[derive(Clone)]
pub struct SpendWindowTracker {
    /// Width of the rolling window (default 24 hours)
    window: Duration,
    /// Width of the velocity sub-window (trailing hour)
    velocity_window: Duration,
    agents: Arc<RwLock<HashMap<AgentId, Vec<WindowEntry>>>>,
    locks: Arc<KeyedLocks<AgentId>>,
}

impl SpendWindowTracker {
    /// Tracker with the standard 24-hour window
    pub fn new() -> Self {
        Self::with_window(Duration::hours(24))
    }

    /// Tracker with a custom window width
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            velocity_window: Duration::hours(1),
            agents: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Sum of the agent's entries in the trailing window
    ///
    /// Prunes entries that have aged out as a side effect.
    pub async fn current_spend(&self, agent_id: &AgentId, now: DateTime<Utc>) -> Amount {
        let mut agents = self.agents.write().await;
        let entries = match agents.get_mut(agent_id) {
            Some(entries) => entries,
            None => return Amount::zero(),
        };
        Self::prune(entries, now - self.window);
        entries.iter().map(|e| e.amount).sum()
    }

    /// Sum of the agent's entries for one category in the trailing window
    pub async fn category_spend(
        &self,
        agent_id: &AgentId,
        category: SpendCategory,
        now: DateTime<Utc>,
    ) -> Amount {
        let mut agents = self.agents.write().await;
        let entries = match agents.get_mut(agent_id) {
            Some(entries) => entries,
            None => return Amount::zero(),
        };
        Self::prune(entries, now - self.window);
        entries
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.amount)
            .sum()
    }

    /// Spend per category in the trailing window
    pub async fn spend_by_category(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> HashMap<SpendCategory, Amount> {
        let mut agents = self.agents.write().await;
        let mut by_category = HashMap::new();
        if let Some(entries) = agents.get_mut(agent_id) {
            Self::prune(entries, now - self.window);
            for entry in entries.iter() {
                let total = by_category.entry(entry.category).or_insert(Amount::zero());
                *total = total.checked_add(entry.amount).unwrap_or(*total);
            }
        }
        by_category
    }

    /// Admit `amount` against the agent's limits, appending a provisional
    /// entry on success
    ///
    /// Checks run cheapest-first: per-transaction cap, daily window,
    /// category cap, velocity. The whole admission holds the per-agent lock,
    /// so concurrent requests are evaluated one at a time.
    pub async fn try_admit(
        &self,
        agent_id: &AgentId,
        amount: Amount,
        category: SpendCategory,
        limits: &AdmissionLimits,
        now: DateTime<Utc>,
    ) -> Result<WindowEntryId> {
        let _guard = self.locks.acquire(agent_id).await;

        if amount > limits.transaction_limit {
            debug!(
                "Admission denied for {}: {} over transaction limit {}",
                agent_id, amount, limits.transaction_limit
            );
            return Err(Denial::TransactionLimitExceeded {
                limit: limits.transaction_limit,
            }
            .into());
        }

        let mut agents = self.agents.write().await;
        let entries = agents.entry(*agent_id).or_default();
        Self::prune(entries, now - self.window);

        let spent: Amount = entries.iter().map(|e| e.amount).sum();
        let projected = spent.checked_add(amount);
        if projected.is_none() || projected.unwrap_or(spent) > limits.daily_limit {
            let remaining = limits.daily_limit.saturating_sub(spent);
            debug!(
                "Admission denied for {}: daily limit, {} remaining",
                agent_id, remaining
            );
            return Err(Denial::DailyLimitExceeded { remaining }.into());
        }

        if let Some(cap) = limits.category_limits.get(&category).copied() {
            let category_spent: Amount = entries
                .iter()
                .filter(|e| e.category == category)
                .map(|e| e.amount)
                .sum();
            let projected = category_spent.checked_add(amount);
            if projected.is_none() || projected.unwrap_or(category_spent) > cap {
                let remaining = cap.saturating_sub(category_spent);
                debug!(
                    "Admission denied for {}: category {} limit, {} remaining",
                    agent_id, category, remaining
                );
                return Err(Denial::CategoryLimitExceeded {
                    category: category.to_string(),
                    remaining,
                }
                .into());
            }
        }

        let velocity_cutoff = now - self.velocity_window;
        let recent = entries.iter().filter(|e| e.at >= velocity_cutoff).count();
        if recent as u32 >= limits.velocity_limit {
            debug!(
                "Admission denied for {}: velocity limit {}",
                agent_id, limits.velocity_limit
            );
            return Err(Denial::VelocityLimitExceeded {
                limit: limits.velocity_limit,
            }
            .into());
        }

        let entry = WindowEntry {
            id: WindowEntryId::new(),
            at: now,
            amount,
            category,
            provisional: true,
        };
        let entry_id = entry.id;
        entries.push(entry);
        Ok(entry_id)
    }

    /// Finalize a provisional entry at the captured amount
    ///
    /// Numerically the entry already counted; this step exists so a later
    /// void can no longer remove it, and to shrink it on partial capture.
    pub async fn commit(
        &self,
        agent_id: &AgentId,
        entry_id: WindowEntryId,
        final_amount: Amount,
    ) {
        let mut agents = self.agents.write().await;
        let Some(entries) = agents.get_mut(agent_id) else {
            debug!("Commit for unknown agent {} ignored", agent_id);
            return;
        };
        match entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.provisional = false;
                entry.amount = final_amount;
            }
            // Entry aged out of the window; nothing left to finalize.
            None => debug!("Commit for pruned entry {} ignored", entry_id),
        }
    }

    /// Remove a provisional entry, restoring the budget it consumed
    ///
    /// Committed entries are settled spend and stay counted; a void for one
    /// is ignored.
    pub async fn void(&self, agent_id: &AgentId, entry_id: WindowEntryId) {
        let mut agents = self.agents.write().await;
        let Some(entries) = agents.get_mut(agent_id) else {
            debug!("Void for unknown agent {} ignored", agent_id);
            return;
        };
        entries.retain(|e| e.id != entry_id || !e.provisional);
    }

    fn prune(entries: &mut Vec<WindowEntry>, cutoff: DateTime<Utc>) {
        entries.retain(|e| e.at >= cutoff);
    }
}

impl Default for SpendWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}
