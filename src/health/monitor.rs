use std::collections::VecDeque;
use tracing::{info, warn};
use crate::config::failover::HealthConfig;
use crate::events::feed::FailureReason;
use crate::health::SourceHealth;
use crate::types::tick::TickSource;
use crate::types::timestamp::Timestamp;

struct SourceTracker {
    health: SourceHealth,
    consecutive_trips: u32,
    /// Silence failures since the last accepted tick. A reconnect does not
    /// clear these; a connection that delivers nothing is still failing.
    silent_sessions: u32,
    /// (second since epoch, ticks in that second), oldest first.
    buckets: VecDeque<(u64, u64)>,
}

impl SourceTracker {
    fn new(source: TickSource) -> Self {
        SourceTracker {
            health: SourceHealth::new(source),
            consecutive_trips: 0,
            silent_sessions: 0,
            buckets: VecDeque::new(),
        }
    }

    fn count_tick(&mut self, at: Timestamp) {
        let second = at.as_millis() / 1_000;
        match self.buckets.back_mut() {
            Some((s, count)) if *s == second => *count += 1,
            _ => self.buckets.push_back((second, 1)),
        }
    }

    fn throughput(&mut self, now: Timestamp, window_secs: u64) -> u64 {
        let cutoff = (now.as_millis() / 1_000).saturating_sub(window_secs);
        while self.buckets.front().is_some_and(|(s, _)| *s < cutoff) {
            self.buckets.pop_front();
        }
        self.buckets.iter().map(|(_, c)| c).sum()
    }
}

/// Tracks liveness of both sources from tick arrival and failure events.
pub struct SourceHealthMonitor {
    config: HealthConfig,
    circuit_trips_for_failure: u32,
    primary: SourceTracker,
    secondary: SourceTracker,
}

impl SourceHealthMonitor {
    pub fn new(config: HealthConfig, circuit_trips_for_failure: u32) -> Self {
        SourceHealthMonitor {
            config,
            circuit_trips_for_failure: circuit_trips_for_failure.max(1),
            primary: SourceTracker::new(TickSource::Primary),
            secondary: SourceTracker::new(TickSource::Secondary),
        }
    }

    fn tracker(&self, source: TickSource) -> &SourceTracker {
        match source {
            TickSource::Primary => &self.primary,
            TickSource::Secondary => &self.secondary,
        }
    }

    fn tracker_mut(&mut self, source: TickSource) -> &mut SourceTracker {
        match source {
            TickSource::Primary => &mut self.primary,
            TickSource::Secondary => &mut self.secondary,
        }
    }

    pub fn health(&self, source: TickSource) -> &SourceHealth {
        &self.tracker(source).health
    }

    /// An accepted tick: resets failures and makes the source healthy.
    pub fn record_tick(&mut self, source: TickSource, at: Timestamp) {
        let tracker = self.tracker_mut(source);
        tracker.count_tick(at);
        tracker.consecutive_trips = 0;
        tracker.silent_sessions = 0;

        let health = &mut tracker.health;
        health.ticks_received += 1;
        health.last_tick_at = Some(at);
        health.consecutive_failures = 0;
        if health.healthy_since.is_none() {
            health.healthy_since = Some(at);
        }
        if !health.is_healthy {
            health.is_healthy = true;
            info!(source = %source, "Source healthy");
        }
    }

    /// Returns true when this failure flipped the source to unhealthy.
    pub fn record_failure(&mut self, source: TickSource, reason: &FailureReason, at: Timestamp) -> bool {
        let unhealthy_after = self.config.unhealthy_after_failures;
        let tracker = self.tracker_mut(source);
        if matches!(reason, FailureReason::Silence { .. }) {
            tracker.silent_sessions = tracker.silent_sessions.saturating_add(1);
        }
        let health = &mut tracker.health;

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.total_failures += 1;
        health.healthy_since = None;
        health.last_failure_at = Some(at);
        health.last_failure_reason = Some(reason.to_string());

        if health.is_healthy && health.consecutive_failures >= unhealthy_after {
            health.is_healthy = false;
            warn!(
                source = %source,
                consecutive_failures = health.consecutive_failures,
                reason = %reason,
                "Source marked unhealthy"
            );
            return true;
        }
        false
    }

    /// A successful (re)connect. Clears connection failures from the streak
    /// without declaring the source healthy; only data does that. Silence
    /// failures stay counted until a tick is accepted.
    pub fn record_probe_success(&mut self, source: TickSource) {
        let tracker = self.tracker_mut(source);
        tracker.health.consecutive_failures = tracker.silent_sessions;
        tracker.health.connected = true;
    }

    pub fn record_disconnect(&mut self, source: TickSource) {
        self.tracker_mut(source).health.connected = false;
    }

    /// Counts a circuit-breaker trip. Trips are data-quality incidents, not
    /// outages: only a streak of them is turned into a health failure, which
    /// is returned so the caller can record it.
    pub fn record_circuit_trip(&mut self, source: TickSource) -> Option<FailureReason> {
        let threshold = self.circuit_trips_for_failure;
        let tracker = self.tracker_mut(source);
        tracker.health.circuit_breaker_trips += 1;
        tracker.consecutive_trips += 1;

        if tracker.consecutive_trips >= threshold {
            let trips = tracker.consecutive_trips;
            tracker.consecutive_trips = 0;
            return Some(FailureReason::RepeatedCircuitTrips(trips));
        }
        None
    }

    /// Marks healthy sources that went quiet as unhealthy. Returns the
    /// sources that changed.
    pub fn check_silence(&mut self, now: Timestamp) -> Vec<TickSource> {
        let mut changed = Vec::new();
        for source in TickSource::ALL {
            let timeout = self.config.silence_timeout(source);
            let health = &mut self.tracker_mut(source).health;
            if !health.is_healthy {
                continue;
            }
            let silent = health.last_tick_at.map(|t| now.saturating_since(t)).unwrap_or_default();
            if silent > timeout {
                health.is_healthy = false;
                health.healthy_since = None;
                health.last_failure_at = Some(now);
                health.last_failure_reason = Some(
                    FailureReason::Silence { silent_ms: silent.as_millis() as u64 }.to_string(),
                );
                warn!(source = %source, silent_ms = silent.as_millis() as u64, "Source silent, marked unhealthy");
                changed.push(source);
            }
        }
        changed
    }

    /// Copy of the source's health with throughput computed as of `now`.
    pub fn snapshot(&mut self, source: TickSource, now: Timestamp) -> SourceHealth {
        let window_secs = self.config.throughput_window().as_secs().max(1);
        let tracker = self.tracker_mut(source);
        let throughput = tracker.throughput(now, window_secs);
        let mut health = tracker.health.clone();
        health.throughput_per_min = throughput * 60 / window_secs;
        health
    }
}
