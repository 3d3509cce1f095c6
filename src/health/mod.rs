//! Per-source liveness tracking.
//!
//! `SourceHealthMonitor` is owned by the router worker and is the only
//! writer of `SourceHealth`; everyone else sees copies inside the published
//! health snapshot.

pub mod monitor;

use serde::{Deserialize, Serialize};
use crate::types::tick::TickSource;
use crate::types::timestamp::Timestamp;

pub use monitor::SourceHealthMonitor;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source: TickSource,
    pub is_healthy: bool,
    pub last_tick_at: Option<Timestamp>,
    pub consecutive_failures: u32,
    pub ticks_received: u64,
    /// Start of the current uninterrupted healthy stretch; any failure clears it.
    pub healthy_since: Option<Timestamp>,
    pub last_failure_at: Option<Timestamp>,
    pub last_failure_reason: Option<String>,
    pub total_failures: u64,
    pub circuit_breaker_trips: u64,
    pub throughput_per_min: u64,
    pub connected: bool,
}

impl SourceHealth {
    pub fn new(source: TickSource) -> Self {
        SourceHealth {
            source,
            is_healthy: false,
            last_tick_at: None,
            consecutive_failures: 0,
            ticks_received: 0,
            healthy_since: None,
            last_failure_at: None,
            last_failure_reason: None,
            total_failures: 0,
            circuit_breaker_trips: 0,
            throughput_per_min: 0,
            connected: false,
        }
    }

    /// Not usable as the active source.
    pub fn is_degraded(&self, failure_threshold: u32) -> bool {
        !self.is_healthy || self.consecutive_failures >= failure_threshold
    }

    /// Healthy without interruption for at least `grace`.
    pub fn is_stable_for(&self, grace: std::time::Duration, now: Timestamp) -> bool {
        self.is_healthy
            && self.healthy_since.is_some_and(|since| now.saturating_since(since) >= grace)
    }
}
