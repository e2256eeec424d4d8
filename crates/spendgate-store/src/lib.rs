//! Spendgate Store - the persistence seam
//!
//! The authorization core never touches a backend directly; it goes through
//! the [`Store`] trait injected at construction. A production deployment
//! plugs in a durable, transactional backend; tests and single-process
//! deployments use the bundled [`MemoryStore`].
//!
//! # Invariants the backend must honor
//!
//! 1. `transition_reservation` is an atomic compare-and-set on status:
//!    two racing callers can never both win the same transition.
//! 2. `put_*` is last-writer-wins for full rows; callers serialize
//!    read-modify-write cycles themselves via [`KeyedLocks`].

pub mod locks;
pub mod memory;

pub use locks::KeyedLocks;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spendgate_types::{
    AgentId, AgentProfile, Reservation, ReservationId, ReservationStatus, Result, Wallet, WalletId,
};

/// Durable get/put of wallets, agent profiles, and reservations
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a wallet row
    async fn put_wallet(&self, wallet: Wallet) -> Result<()>;

    /// Fetch a wallet, `Fault::WalletNotFound` if absent
    async fn wallet(&self, id: &WalletId) -> Result<Wallet>;

    /// Insert or replace an agent profile
    async fn put_agent(&self, agent: AgentProfile) -> Result<()>;

    /// Fetch an agent profile, `Fault::AgentNotFound` if absent
    async fn agent(&self, id: &AgentId) -> Result<AgentProfile>;

    /// Insert or replace a reservation row
    async fn put_reservation(&self, reservation: Reservation) -> Result<()>;

    /// Fetch a reservation, `Fault::ReservationNotFound` if absent
    async fn reservation(&self, id: &ReservationId) -> Result<Reservation>;

    /// Atomically move a reservation from `expected` to `next`
    ///
    /// Returns the updated reservation on success. Fails with
    /// `Fault::InvalidTransition` carrying the actual current status when the
    /// reservation is no longer in `expected` - the loser of a confirm/sweep
    /// race sees that fault and reacts gracefully.
    async fn transition_reservation(
        &self,
        id: &ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<Reservation>;

    /// All pending reservations whose `expires_at` is before `now`
    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;
}
