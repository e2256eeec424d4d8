//! In-memory store backend
//!
//! The reference implementation of [`Store`]: good for tests and
//! single-process deployments. Multi-process deployments need a backend with
//! real durability; the trait is the seam.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use spendgate_types::{
    AgentId, AgentProfile, Fault, Reservation, ReservationId, ReservationStatus, Result, Wallet,
    WalletId,
};

use crate::Store;

/// Thread-safe in-memory [`Store`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    wallets: Arc<RwLock<HashMap<WalletId, Wallet>>>,
    agents: Arc<RwLock<HashMap<AgentId, AgentProfile>>>,
    reservations: Arc<RwLock<HashMap<ReservationId, Reservation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_wallet(&self, wallet: Wallet) -> Result<()> {
        self.wallets.write().await.insert(wallet.id, wallet);
        Ok(())
    }

    async fn wallet(&self, id: &WalletId) -> Result<Wallet> {
        self.wallets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| {
                Fault::WalletNotFound {
                    wallet_id: id.to_string(),
                }
                .into()
            })
    }

    async fn put_agent(&self, agent: AgentProfile) -> Result<()> {
        self.agents.write().await.insert(agent.id, agent);
        Ok(())
    }

    async fn agent(&self, id: &AgentId) -> Result<AgentProfile> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| {
                Fault::AgentNotFound {
                    agent_id: id.to_string(),
                }
                .into()
            })
    }

    async fn put_reservation(&self, reservation: Reservation) -> Result<()> {
        self.reservations
            .write()
            .await
            .insert(reservation.id, reservation);
        Ok(())
    }

    async fn reservation(&self, id: &ReservationId) -> Result<Reservation> {
        self.reservations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| {
                Fault::ReservationNotFound {
                    reservation_id: id.to_string(),
                }
                .into()
            })
    }

    async fn transition_reservation(
        &self,
        id: &ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<Reservation> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations.get_mut(id).ok_or(Fault::ReservationNotFound {
            reservation_id: id.to_string(),
        })?;

        if reservation.status != expected {
            return Err(Fault::InvalidTransition {
                reservation_id: id.to_string(),
                from: reservation.status,
                to: next,
            }
            .into());
        }

        reservation.status = next;
        Ok(reservation.clone())
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let reservations = self.reservations.read().await;
        Ok(reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.is_expired(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use spendgate_types::{Amount, PurchaseMetadata, SpendError, WindowEntryId};

    fn pending_reservation(expires_in: Duration) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: ReservationId::new(),
            agent_id: AgentId::new(),
            wallet_id: WalletId::new(),
            amount: Amount::new(100),
            metadata: PurchaseMetadata::default(),
            window_entry: WindowEntryId::new(),
            status: ReservationStatus::Pending,
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[tokio::test]
    async fn test_wallet_roundtrip() {
        let store = MemoryStore::new();
        let wallet = Wallet::new();
        let id = wallet.id;
        store.put_wallet(wallet).await.unwrap();
        assert_eq!(store.wallet(&id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_missing_wallet_is_a_fault() {
        let store = MemoryStore::new();
        let result = store.wallet(&WalletId::new()).await;
        assert!(matches!(
            result,
            Err(SpendError::Fault(Fault::WalletNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_transition_cas_single_winner() {
        let store = MemoryStore::new();
        let reservation = pending_reservation(Duration::minutes(10));
        let id = reservation.id;
        store.put_reservation(reservation).await.unwrap();

        let confirmed = store
            .transition_reservation(&id, ReservationStatus::Pending, ReservationStatus::Confirmed)
            .await;
        assert!(confirmed.is_ok());

        // The second terminal transition loses the CAS.
        let expired = store
            .transition_reservation(&id, ReservationStatus::Pending, ReservationStatus::Expired)
            .await;
        assert!(matches!(
            expired,
            Err(SpendError::Fault(Fault::InvalidTransition { .. }))
        ));
        assert_eq!(
            store.reservation(&id).await.unwrap().status,
            ReservationStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_expired_pending_scan() {
        let store = MemoryStore::new();
        let stale = pending_reservation(Duration::minutes(-5));
        let fresh = pending_reservation(Duration::minutes(5));
        let stale_id = stale.id;
        store.put_reservation(stale).await.unwrap();
        store.put_reservation(fresh).await.unwrap();

        let expired = store.expired_pending(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale_id);
    }
}
