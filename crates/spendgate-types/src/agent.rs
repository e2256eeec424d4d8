//! Agent profile types
//!
//! An agent spends against a wallet it does not own: many agents can share
//! one wallet, and an agent can be revoked while the wallet persists.

use crate::{Amount, AgentId, SpendCategory, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-agent spending controls and status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent ID
    pub id: AgentId,
    /// The wallet this agent spends from
    pub wallet_id: WalletId,
    /// Maximum committed spend in the trailing window
    pub daily_limit: Amount,
    /// Maximum amount of a single purchase
    pub transaction_limit: Amount,
    /// Maximum number of authorizations in the trailing hour
    pub velocity_limit: u32,
    /// Per-category caps inside the same trailing window
    pub category_limits: HashMap<SpendCategory, Amount>,
    /// When true, every authorization is denied immediately
    pub emergency_stopped: bool,
    /// When true, the agent may no longer authorize anything
    pub revoked: bool,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl AgentProfile {
    /// Create a profile with the given wallet and daily limit
    ///
    /// Transaction limit defaults to the daily limit (one purchase may use
    /// the whole budget); velocity defaults to 60/hour; no category caps.
    pub fn new(wallet_id: WalletId, daily_limit: Amount) -> Self {
        Self {
            id: AgentId::new(),
            wallet_id,
            daily_limit,
            transaction_limit: daily_limit,
            velocity_limit: 60,
            category_limits: HashMap::new(),
            emergency_stopped: false,
            revoked: false,
            created_at: Utc::now(),
        }
    }

    /// Cap for a category, if one is configured
    pub fn category_limit(&self, category: SpendCategory) -> Option<Amount> {
        self.category_limits.get(&category).copied()
    }
}

/// Owner-initiated update to an agent's spending controls
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigUpdate {
    pub daily_limit: Option<Amount>,
    pub transaction_limit: Option<Amount>,
    pub velocity_limit: Option<u32>,
    pub category_limits: Option<HashMap<SpendCategory, Amount>>,
}

impl AgentProfile {
    /// Apply a config update in place
    pub fn apply(&mut self, update: AgentConfigUpdate) {
        if let Some(daily) = update.daily_limit {
            self.daily_limit = daily;
        }
        if let Some(txn) = update.transaction_limit {
            self.transaction_limit = txn;
        }
        if let Some(velocity) = update.velocity_limit {
            self.velocity_limit = velocity;
        }
        if let Some(categories) = update.category_limits {
            self.category_limits = categories;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_partial_update() {
        let mut profile = AgentProfile::new(WalletId::new(), Amount::new(50_00));
        profile.apply(AgentConfigUpdate {
            transaction_limit: Some(Amount::new(20_00)),
            ..Default::default()
        });
        assert_eq!(profile.daily_limit, Amount::new(50_00));
        assert_eq!(profile.transaction_limit, Amount::new(20_00));
    }

    #[test]
    fn test_category_limit_lookup() {
        let mut profile = AgentProfile::new(WalletId::new(), Amount::new(50_00));
        profile
            .category_limits
            .insert(SpendCategory::Food, Amount::new(10_00));
        assert_eq!(
            profile.category_limit(SpendCategory::Food),
            Some(Amount::new(10_00))
        );
        assert_eq!(profile.category_limit(SpendCategory::Flights), None);
    }
}
