//! Retry policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff for transient dispatch failures
///
/// Attempt 1 runs immediately; attempt `n > 1` waits
/// `initial_interval * coefficient^(n - 2)`, capped at `max_interval`.
/// With the defaults the waits are 1s, 2s, 4s, 8s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Wait before the first retry (seconds)
    pub initial_interval_secs: u64,
    /// Upper bound on any single wait (seconds)
    pub max_interval_secs: u64,
    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Base 1s, doubling, capped at 60s, 5 attempts
    pub fn exponential() -> Self {
        Self {
            max_attempts: 5,
            initial_interval_secs: 1,
            max_interval_secs: 60,
            backoff_coefficient: 2.0,
        }
    }

    /// Single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval_secs: 0,
            max_interval_secs: 0,
            backoff_coefficient: 1.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Wait before a given attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let base = self.initial_interval_secs as f64 * self.backoff_coefficient.max(1.0).powi(exponent);
        let capped = base.min(self.max_interval_secs as f64);
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Whether another attempt may follow `current_attempt`
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}
