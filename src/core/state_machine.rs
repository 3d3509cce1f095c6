use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::config::failover::FailoverConfig;
use crate::events::transition::PhaseTransition;
use crate::health::SourceHealth;
use crate::types::ids::TransitionId;
use crate::types::tick::TickSource;
use crate::types::timestamp::Timestamp;
use crate::utils::helper::alert_operations_team_warning;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouterPhase {
    Startup,
    PrimaryActive,
    FallbackActive,
    BothUnavailable,
}

impl RouterPhase {
    pub const ALL: [RouterPhase; 4] = [
        RouterPhase::Startup,
        RouterPhase::PrimaryActive,
        RouterPhase::FallbackActive,
        RouterPhase::BothUnavailable,
    ];

    /// Source whose ticks are forwarded in this phase.
    pub fn active_source(&self) -> Option<TickSource> {
        match self {
            RouterPhase::PrimaryActive => Some(TickSource::Primary),
            RouterPhase::FallbackActive => Some(TickSource::Secondary),
            RouterPhase::Startup | RouterPhase::BothUnavailable => None,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.active_source().is_some()
    }

    /// Counted towards the accumulated fallback duration.
    pub fn is_fallback(&self) -> bool {
        matches!(self, RouterPhase::FallbackActive | RouterPhase::BothUnavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouterPhase::Startup => "STARTUP",
            RouterPhase::PrimaryActive => "PRIMARY_ACTIVE",
            RouterPhase::FallbackActive => "FALLBACK_ACTIVE",
            RouterPhase::BothUnavailable => "BOTH_UNAVAILABLE",
        }
    }

    fn index(&self) -> usize {
        match self {
            RouterPhase::Startup => 0,
            RouterPhase::PrimaryActive => 1,
            RouterPhase::FallbackActive => 2,
            RouterPhase::BothUnavailable => 3,
        }
    }

    pub fn gauge_value(&self) -> i64 {
        self.index() as i64
    }
}

impl fmt::Display for RouterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing state. Owned by the router worker; never shared mutably.
#[derive(Clone, Debug)]
pub struct RouterState {
    pub phase: RouterPhase,
    pub phase_entered_at: Timestamp,
    pub reason: String,
    pub fallback_activation_count: u64,
    pub transition_count: u64,
    pub started_at: Timestamp,
    pub previous_phase: Option<RouterPhase>,
    pub previous_phase_duration: Duration,
    pub manual_hold_until: Option<Timestamp>,
    /// Closed stretches only; the running phase is added on read.
    phase_durations: [Duration; 4],
}

impl RouterState {
    pub fn new(now: Timestamp) -> Self {
        RouterState {
            phase: RouterPhase::Startup,
            phase_entered_at: now,
            reason: "process started".to_string(),
            fallback_activation_count: 0,
            transition_count: 0,
            started_at: now,
            previous_phase: None,
            previous_phase_duration: Duration::ZERO,
            manual_hold_until: None,
            phase_durations: [Duration::ZERO; 4],
        }
    }

    pub fn time_in_phase(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.phase_entered_at)
    }

    /// Accumulated time spent in `phase`, including the running stretch.
    pub fn phase_duration(&self, phase: RouterPhase, now: Timestamp) -> Duration {
        let closed = self.phase_durations[phase.index()];
        if phase == self.phase {
            closed + self.time_in_phase(now)
        } else {
            closed
        }
    }

    /// Time spent outside primary service, excluding startup.
    pub fn total_fallback_duration(&self, now: Timestamp) -> Duration {
        self.phase_duration(RouterPhase::FallbackActive, now)
            + self.phase_duration(RouterPhase::BothUnavailable, now)
    }

    /// Share of time since start during which a source was being served.
    pub fn uptime_percent(&self, now: Timestamp) -> f64 {
        let elapsed = now.saturating_since(self.started_at);
        if elapsed.is_zero() {
            return if self.phase.is_serving() { 100.0 } else { 0.0 };
        }
        let serving = self.phase_duration(RouterPhase::PrimaryActive, now)
            + self.phase_duration(RouterPhase::FallbackActive, now);
        (serving.as_secs_f64() / elapsed.as_secs_f64() * 100.0).clamp(0.0, 100.0)
    }

    pub fn manual_hold_active(&self, now: Timestamp) -> bool {
        self.manual_hold_until.is_some_and(|until| now < until)
    }

    fn enter(&mut self, to: RouterPhase, reason: String, now: Timestamp) -> (RouterPhase, Duration) {
        let from = self.phase;
        let stayed = self.time_in_phase(now);
        self.phase_durations[from.index()] += stayed;

        if from == RouterPhase::PrimaryActive && to == RouterPhase::FallbackActive {
            self.fallback_activation_count += 1;
        }

        self.previous_phase = Some(from);
        self.previous_phase_duration = stayed;
        self.phase = to;
        self.phase_entered_at = now;
        self.reason = reason;
        self.transition_count += 1;
        (from, stayed)
    }
}

/// Pure phase logic: no I/O, time passed in explicitly.
pub struct FailoverStateMachine {
    config: FailoverConfig,
    state: RouterState,
    history: VecDeque<PhaseTransition>,
}

impl FailoverStateMachine {
    pub fn new(config: FailoverConfig, now: Timestamp) -> Self {
        FailoverStateMachine {
            config,
            state: RouterState::new(now),
            history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn phase(&self) -> RouterPhase {
        self.state.phase
    }

    pub fn history(&self) -> impl Iterator<Item = &PhaseTransition> {
        self.history.iter()
    }

    /// Routing decision for an accepted tick.
    pub fn should_forward(&self, source: TickSource) -> bool {
        self.state.phase.active_source() == Some(source)
    }

    fn usable(&self, health: &SourceHealth) -> bool {
        !health.is_degraded(self.config.failure_threshold)
    }

    /// Applies the health- and time-driven transition rules once.
    pub fn evaluate(
        &mut self,
        primary: &SourceHealth,
        secondary: &SourceHealth,
        now: Timestamp,
    ) -> Option<PhaseTransition> {
        let (to, reason) = match self.state.phase {
            RouterPhase::Startup => {
                if self.usable(primary) {
                    (RouterPhase::PrimaryActive, "first primary tick accepted".to_string())
                } else if now.saturating_since(self.state.started_at) >= self.config.startup_grace()
                    && self.usable(secondary)
                {
                    (
                        RouterPhase::FallbackActive,
                        format!(
                            "primary silent for startup grace of {}ms; secondary healthy",
                            self.config.startup_grace_ms
                        ),
                    )
                } else {
                    return None;
                }
            }
            RouterPhase::PrimaryActive => {
                if !primary.is_degraded(self.config.failure_threshold) {
                    return None;
                }
                if self.usable(secondary) {
                    (RouterPhase::FallbackActive, format!("primary degraded ({})", describe(primary)))
                } else {
                    (
                        RouterPhase::BothUnavailable,
                        format!("primary degraded ({}); secondary unhealthy", describe(primary)),
                    )
                }
            }
            RouterPhase::FallbackActive => {
                if primary.is_stable_for(self.config.recovery_grace(), now)
                    && self.usable(primary)
                    && !self.state.manual_hold_active(now)
                {
                    (
                        RouterPhase::PrimaryActive,
                        format!(
                            "primary healthy for recovery grace of {}ms",
                            self.config.recovery_grace_ms
                        ),
                    )
                } else if secondary.is_degraded(self.config.failure_threshold) {
                    if self.usable(primary) {
                        if self.state.manual_hold_until.take().is_some() {
                            warn!("Manual hold released: secondary degraded while primary is healthy");
                        }
                        (
                            RouterPhase::PrimaryActive,
                            format!("secondary degraded ({}); primary healthy", describe(secondary)),
                        )
                    } else {
                        (
                            RouterPhase::BothUnavailable,
                            format!("secondary degraded ({}); primary unhealthy", describe(secondary)),
                        )
                    }
                } else {
                    return None;
                }
            }
            RouterPhase::BothUnavailable => {
                if self.usable(primary) {
                    (RouterPhase::PrimaryActive, "primary healthy again".to_string())
                } else if self.usable(secondary) {
                    (RouterPhase::FallbackActive, "secondary healthy again".to_string())
                } else {
                    return None;
                }
            }
        };

        Some(self.transition(to, reason, now, false))
    }

    /// Administrative failover. No-op when already on the fallback, refused
    /// while the secondary is not usable.
    pub fn force_failover(&mut self, secondary: &SourceHealth, now: Timestamp) -> Option<PhaseTransition> {
        if self.state.phase == RouterPhase::FallbackActive {
            return None;
        }
        if !self.usable(secondary) {
            warn!(secondary = %describe(secondary), "Manual failover refused: secondary not usable");
            return None;
        }
        self.state.manual_hold_until = Some(now + self.config.manual_hold());
        Some(self.transition(RouterPhase::FallbackActive, "manual failover".to_string(), now, true))
    }

    /// Lifts a manual hold so the normal recovery path applies again.
    pub fn clear_manual_hold(&mut self) -> bool {
        self.state.manual_hold_until.take().is_some()
    }

    fn transition(&mut self, to: RouterPhase, reason: String, now: Timestamp, manual: bool) -> PhaseTransition {
        let (from, stayed) = self.state.enter(to, reason.clone(), now);

        let record = PhaseTransition {
            id: TransitionId::new(),
            from,
            to,
            reason,
            at: now,
            from_duration_ms: stayed.as_millis() as u64,
            fallback_activation_count: self.state.fallback_activation_count,
            manual,
        };

        if to == RouterPhase::BothUnavailable {
            alert_operations_team_warning(format!(
                "No price source available: {}",
                record.reason
            ));
        } else if to == RouterPhase::FallbackActive {
            warn!(
                from = %from,
                reason = %record.reason,
                activations = record.fallback_activation_count,
                "Failover to secondary source"
            );
        } else {
            info!(from = %from, to = %to, reason = %record.reason, "Router phase changed");
        }

        if self.history.len() >= self.config.transition_history.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        record
    }
}

fn describe(health: &SourceHealth) -> String {
    match &health.last_failure_reason {
        Some(reason) if !health.is_healthy => format!("unhealthy, last failure: {}", reason),
        Some(reason) => format!("{} consecutive failures, last: {}", health.consecutive_failures, reason),
        None => format!("{} consecutive failures", health.consecutive_failures),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn healthy(source: TickSource, since: u64) -> SourceHealth {
        let mut h = SourceHealth::new(source);
        h.is_healthy = true;
        h.healthy_since = Some(at(since));
        h.last_tick_at = Some(at(since));
        h
    }

    fn failing(source: TickSource, failures: u32) -> SourceHealth {
        let mut h = SourceHealth::new(source);
        h.is_healthy = true;
        h.consecutive_failures = failures;
        h.last_failure_reason = Some("silent for 10000ms".to_string());
        h
    }

    fn down(source: TickSource) -> SourceHealth {
        SourceHealth::new(source)
    }

    fn machine() -> FailoverStateMachine {
        FailoverStateMachine::new(FailoverConfig::default(), at(0))
    }

    fn primary_active() -> FailoverStateMachine {
        let mut sm = machine();
        sm.evaluate(&healthy(TickSource::Primary, 100), &down(TickSource::Secondary), at(100));
        assert_eq!(sm.phase(), RouterPhase::PrimaryActive);
        sm
    }

    #[test]
    fn startup_waits_for_primary() {
        let mut sm = machine();
        assert!(sm.evaluate(&down(TickSource::Primary), &healthy(TickSource::Secondary, 0), at(5_000)).is_none());
        assert_eq!(sm.phase(), RouterPhase::Startup);
        assert!(!sm.should_forward(TickSource::Primary));
        assert!(!sm.should_forward(TickSource::Secondary));

        let t = sm.evaluate(&healthy(TickSource::Primary, 6_000), &down(TickSource::Secondary), at(6_000)).unwrap();
        assert_eq!(t.from, RouterPhase::Startup);
        assert_eq!(t.to, RouterPhase::PrimaryActive);
        assert_eq!(sm.state().fallback_activation_count, 0);
    }

    #[test]
    fn startup_falls_back_after_grace() {
        let mut sm = machine();
        let secondary = healthy(TickSource::Secondary, 0);
        assert!(sm.evaluate(&down(TickSource::Primary), &secondary, at(14_999)).is_none());
        let t = sm.evaluate(&down(TickSource::Primary), &secondary, at(15_000)).unwrap();
        assert_eq!(t.to, RouterPhase::FallbackActive);
        // Startup -> fallback is not a primary failover.
        assert_eq!(sm.state().fallback_activation_count, 0);
    }

    #[test]
    fn startup_stays_when_nothing_is_healthy() {
        let mut sm = machine();
        assert!(sm.evaluate(&down(TickSource::Primary), &down(TickSource::Secondary), at(60_000)).is_none());
        assert_eq!(sm.phase(), RouterPhase::Startup);
    }

    #[test]
    fn primary_failures_trigger_failover_when_secondary_healthy() {
        let mut sm = primary_active();
        let secondary = healthy(TickSource::Secondary, 0);

        assert!(sm.evaluate(&failing(TickSource::Primary, 2), &secondary, at(1_000)).is_none());
        let t = sm.evaluate(&failing(TickSource::Primary, 3), &secondary, at(2_000)).unwrap();
        assert_eq!(t.to, RouterPhase::FallbackActive);
        assert_eq!(sm.state().fallback_activation_count, 1);
        assert!(sm.should_forward(TickSource::Secondary));
        assert!(!sm.should_forward(TickSource::Primary));
    }

    #[test]
    fn primary_failure_without_secondary_is_both_unavailable() {
        let mut sm = primary_active();
        let t = sm.evaluate(&failing(TickSource::Primary, 3), &down(TickSource::Secondary), at(2_000)).unwrap();
        assert_eq!(t.to, RouterPhase::BothUnavailable);
        assert_eq!(sm.state().fallback_activation_count, 0);
        assert!(!sm.should_forward(TickSource::Primary));
        assert!(!sm.should_forward(TickSource::Secondary));
    }

    #[test]
    fn switch_back_requires_continuous_recovery_grace() {
        let mut sm = primary_active();
        let secondary = healthy(TickSource::Secondary, 0);
        sm.evaluate(&failing(TickSource::Primary, 3), &secondary, at(1_000));
        assert_eq!(sm.phase(), RouterPhase::FallbackActive);

        // Healthy again from t=20s.
        let recovered = healthy(TickSource::Primary, 20_000);
        assert!(sm.evaluate(&recovered, &secondary, at(29_999)).is_none());
        assert_eq!(sm.phase(), RouterPhase::FallbackActive);

        let t = sm.evaluate(&recovered, &secondary, at(30_000)).unwrap();
        assert_eq!(t.to, RouterPhase::PrimaryActive);
    }

    #[test]
    fn flapping_primary_does_not_switch_back() {
        let mut sm = primary_active();
        let secondary = healthy(TickSource::Secondary, 0);
        sm.evaluate(&failing(TickSource::Primary, 3), &secondary, at(1_000));

        // Recovers at 20s, flaps at 25s (healthy_since cleared), healthy again at 26s.
        assert!(sm.evaluate(&healthy(TickSource::Primary, 20_000), &secondary, at(24_000)).is_none());
        let mut flapped = healthy(TickSource::Primary, 0);
        flapped.healthy_since = None;
        flapped.consecutive_failures = 1;
        assert!(sm.evaluate(&flapped, &secondary, at(25_000)).is_none());
        assert!(sm.evaluate(&healthy(TickSource::Primary, 26_000), &secondary, at(31_000)).is_none());
        assert_eq!(sm.phase(), RouterPhase::FallbackActive);

        assert!(sm.evaluate(&healthy(TickSource::Primary, 26_000), &secondary, at(36_000)).is_some());
        assert_eq!(sm.phase(), RouterPhase::PrimaryActive);
    }

    #[test]
    fn both_unavailable_prefers_primary() {
        let mut sm = primary_active();
        sm.evaluate(&failing(TickSource::Primary, 3), &down(TickSource::Secondary), at(1_000));
        assert_eq!(sm.phase(), RouterPhase::BothUnavailable);

        let t = sm
            .evaluate(&healthy(TickSource::Primary, 2_000), &healthy(TickSource::Secondary, 2_000), at(2_000))
            .unwrap();
        assert_eq!(t.to, RouterPhase::PrimaryActive);
    }

    #[test]
    fn both_unavailable_recovers_to_secondary() {
        let mut sm = primary_active();
        sm.evaluate(&failing(TickSource::Primary, 3), &down(TickSource::Secondary), at(1_000));
        let t = sm
            .evaluate(&down(TickSource::Primary), &healthy(TickSource::Secondary, 2_000), at(2_000))
            .unwrap();
        assert_eq!(t.to, RouterPhase::FallbackActive);
    }

    #[test]
    fn secondary_loss_during_fallback() {
        let mut sm = primary_active();
        sm.evaluate(&failing(TickSource::Primary, 3), &healthy(TickSource::Secondary, 0), at(1_000));

        let t = sm.evaluate(&down(TickSource::Primary), &down(TickSource::Secondary), at(2_000)).unwrap();
        assert_eq!(t.to, RouterPhase::BothUnavailable);
    }

    #[test]
    fn secondary_loss_prefers_healthy_primary_inside_grace() {
        let mut sm = primary_active();
        sm.evaluate(&failing(TickSource::Primary, 3), &healthy(TickSource::Secondary, 0), at(1_000));

        let t = sm
            .evaluate(&healthy(TickSource::Primary, 1_500), &down(TickSource::Secondary), at(2_000))
            .unwrap();
        assert_eq!(t.to, RouterPhase::PrimaryActive);
    }

    #[test]
    fn force_failover_is_idempotent() {
        let mut sm = primary_active();
        let first = sm.force_failover(&healthy(TickSource::Secondary, 0), at(1_000)).unwrap();
        assert!(first.manual);
        assert_eq!(sm.phase(), RouterPhase::FallbackActive);
        assert_eq!(sm.state().fallback_activation_count, 1);

        assert!(sm.force_failover(&healthy(TickSource::Secondary, 0), at(1_001)).is_none());
        assert_eq!(sm.phase(), RouterPhase::FallbackActive);
        assert_eq!(sm.state().fallback_activation_count, 1);
        assert_eq!(sm.state().transition_count, 2);
    }

    #[test]
    fn manual_hold_suppresses_switch_back_until_cleared() {
        let mut sm = primary_active();
        sm.force_failover(&healthy(TickSource::Secondary, 0), at(1_000));
        let secondary = healthy(TickSource::Secondary, 0);
        let primary = healthy(TickSource::Primary, 0);

        assert!(sm.evaluate(&primary, &secondary, at(30_000)).is_none());
        assert!(sm.clear_manual_hold());
        assert!(!sm.clear_manual_hold());
        let t = sm.evaluate(&primary, &secondary, at(30_001)).unwrap();
        assert_eq!(t.to, RouterPhase::PrimaryActive);
    }

    #[test]
    fn force_failover_refused_without_usable_secondary() {
        let mut sm = primary_active();
        assert!(sm.force_failover(&down(TickSource::Secondary), at(1_000)).is_none());
        assert!(sm.force_failover(&failing(TickSource::Secondary, 3), at(1_000)).is_none());
        assert_eq!(sm.phase(), RouterPhase::PrimaryActive);
        assert!(sm.state().manual_hold_until.is_none());
    }

    #[test]
    fn secondary_loss_releases_manual_hold() {
        let mut sm = primary_active();
        sm.force_failover(&healthy(TickSource::Secondary, 0), at(1_000));

        let t = sm
            .evaluate(&healthy(TickSource::Primary, 0), &failing(TickSource::Secondary, 3), at(2_000))
            .unwrap();
        assert_eq!(t.to, RouterPhase::PrimaryActive);
        assert!(sm.state().manual_hold_until.is_none());
    }

    #[test]
    fn manual_hold_expires() {
        let mut sm = primary_active();
        sm.force_failover(&healthy(TickSource::Secondary, 0), at(1_000));
        let secondary = healthy(TickSource::Secondary, 0);
        let primary = healthy(TickSource::Primary, 0);

        assert!(sm.evaluate(&primary, &secondary, at(60_999)).is_none());
        assert!(sm.evaluate(&primary, &secondary, at(61_000)).is_some());
    }

    #[test]
    fn durations_accumulate_across_phases() {
        let mut sm = machine();
        let secondary = healthy(TickSource::Secondary, 0);
        sm.evaluate(&healthy(TickSource::Primary, 1_000), &secondary, at(1_000));
        sm.evaluate(&failing(TickSource::Primary, 3), &secondary, at(11_000));
        sm.evaluate(&down(TickSource::Primary), &down(TickSource::Secondary), at(16_000));

        let state = sm.state();
        assert_eq!(state.phase, RouterPhase::BothUnavailable);
        assert_eq!(state.previous_phase, Some(RouterPhase::FallbackActive));
        assert_eq!(state.previous_phase_duration, Duration::from_secs(5));
        assert_eq!(state.phase_duration(RouterPhase::PrimaryActive, at(20_000)), Duration::from_secs(10));
        // 5s fallback + 4s running both-unavailable.
        assert_eq!(state.total_fallback_duration(at(20_000)), Duration::from_secs(9));
        // Served 15s of 20s.
        assert!((state.uptime_percent(at(20_000)) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded() {
        let mut config = FailoverConfig::default();
        config.transition_history = 2;
        let mut sm = FailoverStateMachine::new(config, at(0));
        let secondary = healthy(TickSource::Secondary, 0);
        sm.evaluate(&healthy(TickSource::Primary, 0), &secondary, at(1));
        sm.evaluate(&failing(TickSource::Primary, 3), &secondary, at(2));
        sm.evaluate(&failing(TickSource::Primary, 3), &down(TickSource::Secondary), at(3));

        let history: Vec<_> = sm.history().map(|t| t.to).collect();
        assert_eq!(history, vec![RouterPhase::FallbackActive, RouterPhase::BothUnavailable]);
    }
}
