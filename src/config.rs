use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for quoting and committing. Every field has a default, so a
/// partial JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest difference tolerated between a shown quote and a re-derived one.
    pub quote_epsilon: Decimal,
    /// Validity of quotes not bounded by a discount tier.
    pub quote_ttl_minutes: i64,
    pub capture_timeout_ms: u64,
    pub max_capture_attempts: u32,
    /// Upper bound on how long to honour a gateway's retry hint.
    pub capture_retry_ceiling_ms: u64,
    pub max_settlement_attempts: u32,
    pub tier_cache_capacity: usize,
    pub tier_cache_ttl_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_epsilon: dec!(0.01),
            quote_ttl_minutes: 15,
            capture_timeout_ms: 5_000,
            max_capture_attempts: 3,
            capture_retry_ceiling_ms: 2_000,
            max_settlement_attempts: 3,
            tier_cache_capacity: 256,
            tier_cache_ttl_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn quote_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.quote_ttl_minutes.max(0))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn capture_retry_ceiling(&self) -> Duration {
        Duration::from_millis(self.capture_retry_ceiling_ms)
    }

    pub fn tier_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tier_cache_ttl_secs.max(0))
    }

    /// At least one attempt is always made.
    pub fn capture_attempts(&self) -> u32 {
        self.max_capture_attempts.max(1)
    }

    pub fn settlement_attempts(&self) -> u32 {
        self.max_settlement_attempts.max(1)
    }
}
