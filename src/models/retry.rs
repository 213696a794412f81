use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff schedule applied by the queue when a delivery attempt fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000,
            backoff_multiplier: 2,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Un-jittered delay after the `attempts`-th failure (1-based):
    /// `initial * multiplier^(attempts - 1)`, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = self.backoff_multiplier.max(1).checked_pow(exponent);

        let delay_ms = factor
            .and_then(|factor| self.initial_delay_ms.checked_mul(factor))
            .map_or(self.max_delay_ms, |delay| delay.min(self.max_delay_ms));

        Duration::from_millis(delay_ms)
    }

    /// Delay with `±jitter_factor` applied, never exceeding the cap and never zero.
    pub fn jittered_delay(&self, attempts: u32) -> Duration {
        let base = self.delay_for_attempt(attempts).as_millis() as f64;

        let jitter = if self.jitter_factor > 0.0 {
            rand::random_range(-self.jitter_factor..=self.jitter_factor)
        } else {
            0.0
        };

        let jittered = (base * (1.0 + jitter)).round() as u64;

        Duration::from_millis(jittered.clamp(1, self.max_delay_ms.max(1)))
    }

    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
