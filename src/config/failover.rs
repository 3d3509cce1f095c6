use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::types::tick::TickSource;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures after which a source is marked unhealthy.
    pub unhealthy_after_failures: u32,
    pub primary_silence_timeout_ms: u64,
    pub secondary_silence_timeout_ms: u64,
    pub throughput_window_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            unhealthy_after_failures: 3,
            primary_silence_timeout_ms: 60_000,
            secondary_silence_timeout_ms: 30_000,
            throughput_window_ms: 60_000,
        }
    }
}

impl HealthConfig {
    pub fn silence_timeout(&self, source: TickSource) -> Duration {
        match source {
            TickSource::Primary => Duration::from_millis(self.primary_silence_timeout_ms),
            TickSource::Secondary => Duration::from_millis(self.secondary_silence_timeout_ms),
        }
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_millis(self.throughput_window_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub future_tolerance_ms: u64,
    pub divergence_window_ms: u64,
    /// Fraction, 0.05 == 5%.
    pub divergence_warn_pct: f64,
    /// Fraction, 0.20 == 20%. Fixed across symbols.
    pub circuit_breaker_pct: f64,
    /// Consecutive trips on one symbol after which its baseline is dropped.
    pub circuit_breaker_rebaseline_after: u32,
    /// Consecutive trips on one source that count as a single health failure.
    pub circuit_breaker_trips_for_failure: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            future_tolerance_ms: 5 * 60 * 1_000,
            divergence_window_ms: 30_000,
            divergence_warn_pct: 0.05,
            circuit_breaker_pct: 0.20,
            circuit_breaker_rebaseline_after: 3,
            circuit_breaker_trips_for_failure: 3,
        }
    }
}

impl ValidationConfig {
    pub fn future_tolerance(&self) -> Duration {
        Duration::from_millis(self.future_tolerance_ms)
    }

    pub fn divergence_window(&self) -> Duration {
        Duration::from_millis(self.divergence_window_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Consecutive primary failures that trigger failover.
    pub failure_threshold: u32,
    pub recovery_grace_ms: u64,
    pub startup_grace_ms: u64,
    pub evaluation_interval_ms: u64,
    /// Automatic switch-back is suppressed this long after a forced failover.
    pub manual_hold_ms: u64,
    pub transition_history: usize,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        FailoverConfig {
            failure_threshold: 3,
            recovery_grace_ms: 10_000,
            startup_grace_ms: 15_000,
            evaluation_interval_ms: 1_000,
            manual_hold_ms: 60_000,
            transition_history: 32,
        }
    }
}

impl FailoverConfig {
    pub fn recovery_grace(&self) -> Duration {
        Duration::from_millis(self.recovery_grace_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    pub fn manual_hold(&self) -> Duration {
        Duration::from_millis(self.manual_hold_ms)
    }
}
