use std::collections::BTreeMap;
use std::sync::Arc;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use crate::core::state_machine::{RouterPhase, RouterState};
use crate::distribution::broadcast::DistributionStats;
use crate::events::transition::PhaseTransition;
use crate::health::SourceHealth;
use crate::price_infra::validation::ValidationStats;
use crate::types::symbol::Symbol;
use crate::types::tick::PriceTick;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealthPair {
    pub primary: SourceHealth,
    pub secondary: SourceHealth,
}

/// Point-in-time view of routing and source health.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub phase: RouterPhase,
    pub phase_entered_at: Timestamp,
    pub reason: String,
    pub source_health: SourceHealthPair,
    pub fallback_activation_count: u64,
    pub total_fallback_duration_ms: u64,
    pub uptime_percent: f64,
    pub last_transition_reason: Option<String>,
    pub previous_phase: Option<RouterPhase>,
    pub previous_phase_duration_ms: Option<u64>,
    pub phase_durations_ms: BTreeMap<String, u64>,
    pub transition_count: u64,
    pub manual_hold_until: Option<Timestamp>,
    pub recent_transitions: Vec<PhaseTransition>,
    pub validation: ValidationStats,
    pub distribution: DistributionStats,
    pub subscriber_count: usize,
    pub started_at: Timestamp,
    pub generated_at: Timestamp,
}

impl HealthSnapshot {
    pub fn build(
        state: &RouterState,
        source_health: SourceHealthPair,
        recent_transitions: Vec<PhaseTransition>,
        validation: ValidationStats,
        distribution: DistributionStats,
        now: Timestamp,
    ) -> Self {
        let phase_durations_ms = RouterPhase::ALL
            .iter()
            .map(|phase| (phase.as_str().to_string(), state.phase_duration(*phase, now).as_millis() as u64))
            .collect();

        HealthSnapshot {
            phase: state.phase,
            phase_entered_at: state.phase_entered_at,
            reason: state.reason.clone(),
            source_health,
            fallback_activation_count: state.fallback_activation_count,
            total_fallback_duration_ms: state.total_fallback_duration(now).as_millis() as u64,
            uptime_percent: state.uptime_percent(now),
            last_transition_reason: recent_transitions.last().map(|t| t.reason.clone()),
            previous_phase: state.previous_phase,
            previous_phase_duration_ms: state
                .previous_phase
                .map(|_| state.previous_phase_duration.as_millis() as u64),
            phase_durations_ms,
            transition_count: state.transition_count,
            manual_hold_until: state.manual_hold_until.filter(|until| now < *until),
            recent_transitions,
            validation,
            subscriber_count: distribution.subscribers,
            distribution,
            started_at: state.started_at,
            generated_at: now,
        }
    }
}

/// What readers see: the health snapshot plus the last-known tick per symbol.
#[derive(Clone, Debug)]
pub struct PublishedState {
    pub health: HealthSnapshot,
    pub last_ticks: im::HashMap<Symbol, PriceTick>,
}

/// Single-writer, many-reader publication point. The router worker swaps in
/// a new `PublishedState` after each mutation; readers load without locking.
pub struct SnapshotPublisher {
    current: ArcSwap<PublishedState>,
}

impl SnapshotPublisher {
    pub fn new(initial: PublishedState) -> Self {
        SnapshotPublisher {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn publish(&self, state: PublishedState) {
        self.current.store(Arc::new(state));
    }

    pub fn load(&self) -> Arc<PublishedState> {
        self.current.load_full()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.current.load().health.clone()
    }

    pub fn last_tick(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.current.load().last_ticks.get(symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::price::Price;
    use crate::types::tick::TickSource;
    use crate::types::volume::Volume;

    fn empty_state(now: Timestamp) -> PublishedState {
        let router = RouterState::new(now);
        PublishedState {
            health: HealthSnapshot::build(
                &router,
                SourceHealthPair {
                    primary: SourceHealth::new(TickSource::Primary),
                    secondary: SourceHealth::new(TickSource::Secondary),
                },
                Vec::new(),
                ValidationStats::default(),
                DistributionStats::default(),
                now,
            ),
            last_ticks: im::HashMap::new(),
        }
    }

    #[test]
    fn readers_see_whole_snapshots() {
        let publisher = SnapshotPublisher::new(empty_state(Timestamp::from_millis(0)));
        let before = publisher.load();

        let mut next = empty_state(Timestamp::from_millis(1_000));
        let aapl = Symbol::new("AAPL").unwrap();
        next.last_ticks.insert(
            aapl.clone(),
            PriceTick::new(aapl.clone(), Price::from_f64(1.0), Volume::zero(), Timestamp::from_millis(1), TickSource::Primary),
        );
        publisher.publish(next);

        assert!(before.last_ticks.is_empty());
        assert_eq!(publisher.last_tick(&aapl).unwrap().price(), Price::from_f64(1.0));
        assert_eq!(publisher.health().generated_at, Timestamp::from_millis(1_000));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let state = empty_state(Timestamp::from_millis(0));
        let json = serde_json::to_value(&state.health).unwrap();
        assert_eq!(json["phase"], "STARTUP");
        assert_eq!(json["sourceHealth"]["primary"]["isHealthy"], false);
        assert_eq!(json["phaseDurationsMs"]["STARTUP"], 0);
        assert!(json["previousPhase"].is_null());
    }
}
