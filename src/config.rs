//! Booking configuration, loaded from environment variables with defaults.
use crate::availability::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Upper bound on the slot re-read before booking, in seconds
    pub validation_timeout_secs: u64,
    /// Upper bound on every other storage call, in seconds
    pub store_timeout_secs: u64,
    /// Slots starting sooner than this cannot be booked
    pub min_lead_time_minutes: i64,
    /// Row cap for calendar queries
    pub slot_query_limit: usize,
    /// Attempts at giving a place back when a cancellation races a booking
    pub cancellation_retries: u32,
    /// Shown next to `error` and `critical` failures
    pub support_contact: String,
    /// Location of the sled database
    pub db_path: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            validation_timeout_secs: 10,
            store_timeout_secs: 15,
            min_lead_time_minutes: 60,
            slot_query_limit: 1000,
            cancellation_retries: 3,
            support_contact: "support@donation-centre.example".to_string(),
            db_path: "donation_booking.db".to_string(),
        }
    }
}

impl BookingConfig {
    /// Loads configuration from environment variables; unset or unparsable
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            validation_timeout_secs: env::var("BOOKING_VALIDATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.validation_timeout_secs),
            store_timeout_secs: env::var("BOOKING_STORE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.store_timeout_secs),
            min_lead_time_minutes: env::var("BOOKING_MIN_LEAD_TIME_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_lead_time_minutes),
            slot_query_limit: env::var("BOOKING_SLOT_QUERY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.slot_query_limit),
            cancellation_retries: env::var("BOOKING_CANCELLATION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cancellation_retries),
            support_contact: env::var("BOOKING_SUPPORT_CONTACT")
                .unwrap_or(defaults.support_contact),
            db_path: env::var("BOOKING_DB_PATH").unwrap_or(defaults.db_path),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            fetch_timeout: Duration::from_secs(self.validation_timeout_secs),
            min_lead_time: chrono::Duration::minutes(self.min_lead_time_minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_booking_rules() {
        let config = BookingConfig::default();
        let policy = config.validation_policy();

        assert_eq!(policy.fetch_timeout, Duration::from_secs(10));
        assert_eq!(policy.min_lead_time, chrono::Duration::hours(1));
        assert_eq!(config.slot_query_limit, 1000);
    }
}
