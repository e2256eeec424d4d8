//! Engine configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for the authorization engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Width of the rolling spend window in hours
    pub window_hours: i64,
    /// How long a reservation stays confirmable, in seconds
    pub reservation_ttl_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            // Ten minutes: long enough for an external purchase call, short
            // enough that an abandoned authorization stops on its own.
            reservation_ttl_secs: 600,
        }
    }
}

impl EngineConfig {
    /// Read config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            window_hours: std::env::var("SPENDGATE_WINDOW_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.window_hours),
            reservation_ttl_secs: std::env::var("SPENDGATE_RESERVATION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.reservation_ttl_secs),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::seconds(self.reservation_ttl_secs)
    }
}
