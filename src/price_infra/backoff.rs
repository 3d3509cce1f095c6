use std::time::Duration;
use crate::config::feed::BackoffConfig;
use crate::utils::helper::jittered;

/// Exponential reconnect delay with symmetric jitter, never below the floor.
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Backoff { config, attempt: 0 }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(63) as i32;
        let base = (self.config.initial_ms as f64) * self.config.multiplier.powi(exponent);
        let capped = base.min(self.config.max_ms as f64);
        let final_ms = jittered(capped, self.config.jitter).max(self.config.initial_ms as f64);

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(final_ms as u64)
    }

    /// Reset on successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
