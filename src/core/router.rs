use std::collections::HashMap;
use tracing::{debug, info};
use crate::config::failover::{FailoverConfig, HealthConfig, ValidationConfig};
use crate::core::state_machine::{FailoverStateMachine, RouterPhase};
use crate::distribution::broadcast::DistributionStats;
use crate::distribution::snapshot::{HealthSnapshot, PublishedState, SourceHealthPair};
use crate::events::feed::{ConnectionStatus, FailureReason, FeedEvent};
use crate::events::transition::PhaseTransition;
use crate::health::monitor::SourceHealthMonitor;
use crate::observability::metrics::{
    CIRCUIT_TRIPS, FALLBACK_ACTIVATIONS, PHASE_TRANSITIONS, ROUTER_PHASE, SOURCE_FAILURES,
    SOURCE_HEALTHY, TICKS_FORWARDED, TICKS_SUPPRESSED,
};
use crate::price_infra::validation::{RejectReason, ValidationPipeline, Verdict};
use crate::types::symbol::Symbol;
use crate::types::tick::{PriceTick, TickSource};
use crate::types::timestamp::Timestamp;

/// Everything the router worker owns, driven one event at a time.
///
/// Each handler returns the ticks to publish, in order. Time is always
/// passed in so the whole decision path can be replayed in tests.
pub struct FailoverCore {
    monitor: SourceHealthMonitor,
    validation: ValidationPipeline,
    machine: FailoverStateMachine,
    /// Latest accepted tick per symbol per source while in startup.
    startup_buffer: HashMap<TickSource, HashMap<Symbol, PriceTick>>,
    last_ticks: im::HashMap<Symbol, PriceTick>,
}

impl FailoverCore {
    pub fn new(
        health: HealthConfig,
        validation: ValidationConfig,
        failover: FailoverConfig,
        now: Timestamp,
    ) -> Self {
        let trips_for_failure = validation.circuit_breaker_trips_for_failure;
        ROUTER_PHASE.set(RouterPhase::Startup.gauge_value());
        FailoverCore {
            monitor: SourceHealthMonitor::new(health, trips_for_failure),
            validation: ValidationPipeline::new(validation),
            machine: FailoverStateMachine::new(failover, now),
            startup_buffer: HashMap::new(),
            last_ticks: im::HashMap::new(),
        }
    }

    pub fn phase(&self) -> RouterPhase {
        self.machine.phase()
    }

    pub fn machine(&self) -> &FailoverStateMachine {
        &self.machine
    }

    pub fn monitor(&self) -> &SourceHealthMonitor {
        &self.monitor
    }

    pub fn last_tick(&self, symbol: &Symbol) -> Option<&PriceTick> {
        self.last_ticks.get(symbol)
    }

    pub fn handle_event(&mut self, event: FeedEvent, now: Timestamp) -> Vec<PriceTick> {
        let out = match event {
            FeedEvent::TickReceived { tick, received_at } => self.on_tick(tick, received_at, now),
            FeedEvent::SourceFailure { source, reason, at } => {
                SOURCE_FAILURES.with_label_values(&[source.as_str()]).inc();
                self.monitor.record_failure(source, &reason, at);
                self.evaluate(now)
            }
            FeedEvent::HealthChanged { source, status, .. } => {
                match status {
                    ConnectionStatus::Connected => self.monitor.record_probe_success(source),
                    ConnectionStatus::Disconnected { reason } | ConnectionStatus::AuthFailed { reason } => {
                        debug!(source = %source, reason = %reason, "Source connection lost");
                        self.monitor.record_disconnect(source);
                    }
                }
                self.evaluate(now)
            }
        };
        self.update_health_gauges();
        out
    }

    /// Periodic evaluation: silence detection and time-based transitions.
    pub fn on_timer(&mut self, now: Timestamp) -> Vec<PriceTick> {
        self.monitor.check_silence(now);
        let out = self.evaluate(now);
        self.update_health_gauges();
        out
    }

    /// Switches to the secondary and holds there for the manual hold window.
    pub fn force_failover(&mut self, now: Timestamp) -> Vec<PriceTick> {
        let secondary = self.monitor.health(TickSource::Secondary).clone();
        match self.machine.force_failover(&secondary, now) {
            Some(transition) => self.after_transition(&transition),
            None => {
                if self.machine.phase() == RouterPhase::FallbackActive {
                    info!("Manual failover requested while already on fallback");
                }
                Vec::new()
            }
        }
    }

    /// Lifts any manual hold. The streaming worker is signalled separately.
    pub fn force_reconnect_primary(&mut self) -> bool {
        let cleared = self.machine.clear_manual_hold();
        if cleared {
            info!("Manual hold cleared for primary reconnect");
        }
        cleared
    }

    fn on_tick(&mut self, tick: PriceTick, received_at: Timestamp, now: Timestamp) -> Vec<PriceTick> {
        let source = tick.source();
        match self.validation.validate(&tick, received_at) {
            Verdict::Accept { .. } => {}
            Verdict::Reject(rejection) => {
                if rejection.reason == RejectReason::CircuitBreaker {
                    CIRCUIT_TRIPS.with_label_values(&[source.as_str()]).inc();
                    if let Some(reason) = self.monitor.record_circuit_trip(source) {
                        self.monitor.record_failure(source, &reason, received_at);
                    }
                } else {
                    let reason = FailureReason::InvalidData(format!("{}: {}", rejection.reason, rejection.detail));
                    self.monitor.record_failure(source, &reason, received_at);
                }
                return self.evaluate(now);
            }
        }

        self.monitor.record_tick(source, received_at);

        let was_startup = self.machine.phase() == RouterPhase::Startup;
        if was_startup {
            self.startup_buffer
                .entry(source)
                .or_default()
                .insert(tick.symbol().clone(), tick.clone());
        }

        let mut out = self.evaluate(now);
        if !was_startup {
            if self.machine.should_forward(source) {
                out.push(self.forward(tick));
            } else {
                TICKS_SUPPRESSED.with_label_values(&[source.as_str()]).inc();
            }
        }
        out
    }

    fn evaluate(&mut self, now: Timestamp) -> Vec<PriceTick> {
        let primary = self.monitor.health(TickSource::Primary).clone();
        let secondary = self.monitor.health(TickSource::Secondary).clone();
        match self.machine.evaluate(&primary, &secondary, now) {
            Some(transition) => self.after_transition(&transition),
            None => Vec::new(),
        }
    }

    fn after_transition(&mut self, transition: &PhaseTransition) -> Vec<PriceTick> {
        PHASE_TRANSITIONS
            .with_label_values(&[transition.from.as_str(), transition.to.as_str()])
            .inc();
        ROUTER_PHASE.set(transition.to.gauge_value());
        if transition.from == RouterPhase::PrimaryActive && transition.to == RouterPhase::FallbackActive {
            FALLBACK_ACTIVATIONS.inc();
        }

        if transition.from != RouterPhase::Startup {
            return Vec::new();
        }

        // Leaving startup: release what the new active source buffered.
        let mut buffers = std::mem::take(&mut self.startup_buffer);
        let flushed: Vec<PriceTick> = match transition.to.active_source() {
            Some(active) => buffers.remove(&active).map(|b| b.into_values().collect()).unwrap_or_default(),
            None => Vec::new(),
        };
        if !flushed.is_empty() {
            info!(count = flushed.len(), to = %transition.to, "Flushing ticks buffered during startup");
        }
        flushed.into_iter().map(|tick| self.forward(tick)).collect()
    }

    fn forward(&mut self, tick: PriceTick) -> PriceTick {
        TICKS_FORWARDED.with_label_values(&[tick.source().as_str()]).inc();
        self.last_ticks.insert(tick.symbol().clone(), tick.clone());
        tick
    }

    fn update_health_gauges(&self) {
        for source in TickSource::ALL {
            let healthy = self.monitor.health(source).is_healthy;
            SOURCE_HEALTHY.with_label_values(&[source.as_str()]).set(healthy as i64);
        }
    }

    /// Builds the state readers see.
    pub fn published_state(&mut self, distribution: DistributionStats, now: Timestamp) -> PublishedState {
        let source_health = SourceHealthPair {
            primary: self.monitor.snapshot(TickSource::Primary, now),
            secondary: self.monitor.snapshot(TickSource::Secondary, now),
        };
        let health = HealthSnapshot::build(
            self.machine.state(),
            source_health,
            self.machine.history().cloned().collect(),
            self.validation.stats().clone(),
            distribution,
            now,
        );
        PublishedState {
            health,
            last_ticks: self.last_ticks.clone(),
        }
    }
}
