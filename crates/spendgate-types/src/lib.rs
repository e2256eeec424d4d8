//! Spendgate Types - Canonical domain types for agent spending control
//!
//! This crate contains all foundational types for Spendgate with zero
//! dependencies on other spendgate crates:
//!
//! - Identity types (WalletId, AgentId, ReservationId, etc.)
//! - Minor-unit amount type with checked arithmetic
//! - Wallet and agent profile types
//! - Reservation lifecycle types
//! - Transaction record types (the audit trail)
//! - The Denial / Fault error taxonomy
//!
//! # Architectural Invariants
//!
//! These types support the core Spendgate invariants:
//!
//! 1. For every wallet, at all times, `0 <= reserved <= balance`
//! 2. Committed spend in the trailing window never exceeds the daily limit
//! 3. A reservation reaches exactly one terminal state
//! 4. Transaction records are append-only and never mutated

pub mod agent;
pub mod amount;
pub mod category;
pub mod error;
pub mod id;
pub mod reservation;
pub mod transaction;
pub mod wallet;

pub use agent::*;
pub use amount::*;
pub use category::*;
pub use error::*;
pub use id::*;
pub use reservation::*;
pub use transaction::*;
pub use wallet::*;

/// Version of the Spendgate types schema
pub const TYPES_VERSION: &str = "0.1.0";
