//! Spend categories
//!
//! The category is chosen by the caller at authorization time and carried in
//! the reservation metadata from that point on. It is never reconstructed
//! later by parsing invoice strings or external-service identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of purchase an authorization is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendCategory {
    Flights,
    Hotels,
    Food,
    Shopping,
    Entertainment,
    Transportation,
    GiftCards,
    Domains,
    Sms,
    Services,
    Other,
}

impl Default for SpendCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for SpendCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Flights => "flights",
            Self::Hotels => "hotels",
            Self::Food => "food",
            Self::Shopping => "shopping",
            Self::Entertainment => "entertainment",
            Self::Transportation => "transportation",
            Self::GiftCards => "gift_cards",
            Self::Domains => "domains",
            Self::Sms => "sms",
            Self::Services => "services",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}
