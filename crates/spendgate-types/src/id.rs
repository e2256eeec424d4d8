//! Identity types for Spendgate
//!
//! All identity types are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of different ID types (a reservation token is not a
//! wallet handle, even though both are opaque strings on the wire).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

// Core identity types
define_id_type!(WalletId, "wallet", "Unique identifier for a funded wallet");
define_id_type!(AgentId, "agent", "Unique identifier for a spending agent");

// Operational identity types
define_id_type!(
    ReservationId,
    "resv",
    "Opaque reservation token returned by a successful authorization"
);
define_id_type!(EntryId, "entry", "Unique identifier for a ledger entry");
define_id_type!(
    WindowEntryId,
    "spend",
    "Unique identifier for a spend-window entry"
);
define_id_type!(RecordId, "txr", "Unique identifier for a transaction record");
