//! Spendgate Engine - spending-limit authorization for autonomous agents
//!
//! The engine decides, for each proposed purchase, whether an agent may
//! proceed, tracks cumulative spend across a rolling day window, and
//! atomically reserves, commits, and releases funds as purchases move from
//! authorization to confirmation to settlement.
//!
//! # Contract with the surrounding system
//!
//! The surrounding system (route handlers, purchase-execution collaborators)
//! calls:
//!
//! - [`AuthorizationEngine::authorize`] - approve/deny, returns a
//!   reservation token with a short TTL
//! - [`AuthorizationEngine::confirm`] / [`AuthorizationEngine::void`] -
//!   terminal outcome after the external purchase finishes (these may run in
//!   a different task, worker, or process than the authorize)
//! - [`AuthorizationEngine::sweep_expired`] - from a periodic timer
//! - [`AuthorizationEngine::get_spend_summary`],
//!   [`AuthorizationEngine::set_emergency_stop`] - owner controls
//!
//! External purchase execution happens *between* authorize and
//! confirm/void, outside every lock this crate takes.
//!
//! # Failure semantics
//!
//! Denials (`InsufficientFunds`, `DailyLimitExceeded`, `EmergencyStopped`,
//! ...) are expected outcomes: typed, user-facing, never retried here and
//! never logged as errors. `InvariantViolation` is programmer-error class
//! and logged at error level.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::{AuthorizationEngine, SpendSummary};
