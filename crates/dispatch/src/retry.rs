//! Exponential backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry schedule for HTTP delivery. Delays are milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl From<&marshal_config::RetryConfig> for RetryPolicy {
    fn from(config: &marshal_config::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay_ms,
            max_delay: config.max_delay_ms,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: u64, max_delay: u64) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(backoff_delay(attempt, self.base_delay, self.max_delay))
    }

    /// Every wait the policy performs before giving up
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }
}

/// `min(base * 2^(attempt-1), max)`, saturating
pub fn backoff_delay(attempt: u32, base_delay: u64, max_delay: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(63);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    base_delay.saturating_mul(factor).min(max_delay)
}
