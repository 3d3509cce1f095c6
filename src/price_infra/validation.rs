//! Accept/reject rules applied to every candidate tick before routing.
//!
//! Rules run in a fixed order and the first failing rule decides:
//! non-positive price, negative volume, timestamp too far in the future,
//! then the jump guard. Cross-source divergence is only flagged.

use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::config::failover::ValidationConfig;
use crate::observability::metrics::{DIVERGENCE_FLAGS, TICKS_REJECTED};
use crate::price_infra::circuit_breaker::PriceCircuitBreaker;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::tick::{PriceTick, TickSource};
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InvalidPrice,
    InvalidVolume,
    FutureTimestamp,
    CircuitBreaker,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidPrice => "INVALID_PRICE",
            RejectReason::InvalidVolume => "INVALID_VOLUME",
            RejectReason::FutureTimestamp => "FUTURE_TIMESTAMP",
            RejectReason::CircuitBreaker => "CIRCUIT_BREAKER",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Divergence {
    pub other_source: TickSource,
    pub other_price: Price,
    pub delta: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Accept { divergence: Option<Divergence> },
    Reject(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept { .. })
    }
}

/// Most recent cross-source disagreement seen for a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivergenceRecord {
    pub source: TickSource,
    pub price: Price,
    pub other_source: TickSource,
    pub other_price: Price,
    pub delta_pct: f64,
    pub at: Timestamp,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub accepted: u64,
    pub rejected: u64,
    pub rejected_by_reason: HashMap<RejectReason, u64>,
    pub divergence_flags: u64,
    pub last_divergence: HashMap<Symbol, DivergenceRecord>,
}

#[derive(Clone, Copy)]
struct AcceptedEntry {
    price: Price,
    received_at: Timestamp,
}

pub struct ValidationPipeline {
    config: ValidationConfig,
    breaker: PriceCircuitBreaker,
    last_accepted: HashMap<(TickSource, Symbol), AcceptedEntry>,
    stats: ValidationStats,
}

impl ValidationPipeline {
    pub fn new(config: ValidationConfig) -> Self {
        let breaker = PriceCircuitBreaker::new(
            config.circuit_breaker_pct,
            config.circuit_breaker_rebaseline_after,
        );
        ValidationPipeline {
            config,
            breaker,
            last_accepted: HashMap::new(),
            stats: ValidationStats::default(),
        }
    }

    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Judges `tick` and, on acceptance, makes it the reference for later ticks.
    pub fn validate(&mut self, tick: &PriceTick, received_at: Timestamp) -> Verdict {
        match self.check(tick, received_at) {
            Ok(divergence) => {
                self.last_accepted.insert(
                    (tick.source(), tick.symbol().clone()),
                    AcceptedEntry { price: tick.price(), received_at },
                );
                self.breaker.record_accepted(tick.source(), tick.symbol(), tick.price());
                self.stats.accepted += 1;
                Verdict::Accept { divergence }
            }
            Err(rejection) => {
                self.stats.rejected += 1;
                *self.stats.rejected_by_reason.entry(rejection.reason).or_insert(0) += 1;
                TICKS_REJECTED
                    .with_label_values(&[tick.source().as_str(), rejection.reason.as_str()])
                    .inc();
                warn!(
                    symbol = %tick.symbol(),
                    source = %tick.source(),
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "Tick rejected"
                );
                Verdict::Reject(rejection)
            }
        }
    }

    fn check(&mut self, tick: &PriceTick, received_at: Timestamp) -> Result<Option<Divergence>, Rejection> {
        // Rule 1: price must be positive
        if !tick.price().is_positive() {
            return Err(Rejection {
                reason: RejectReason::InvalidPrice,
                detail: format!("price {} is not positive", tick.price()),
            });
        }

        // Rule 2: volume must not be negative
        if tick.volume().is_negative() {
            return Err(Rejection {
                reason: RejectReason::InvalidVolume,
                detail: format!("volume {} is negative", tick.volume()),
            });
        }

        // Rule 3: quote time not too far ahead of receipt
        let latest_allowed = received_at + self.config.future_tolerance();
        if tick.timestamp() > latest_allowed {
            return Err(Rejection {
                reason: RejectReason::FutureTimestamp,
                detail: format!(
                    "timestamp {}ms ahead of receipt",
                    tick.timestamp().saturating_since(received_at).as_millis()
                ),
            });
        }

        // Rule 4: flag disagreement with the other source
        let divergence = self.divergence(tick, received_at);
        if let Some(d) = &divergence {
            self.stats.divergence_flags += 1;
            self.stats.last_divergence.insert(
                tick.symbol().clone(),
                DivergenceRecord {
                    source: tick.source(),
                    price: tick.price(),
                    other_source: d.other_source,
                    other_price: d.other_price,
                    delta_pct: d.delta * 100.0,
                    at: received_at,
                },
            );
            DIVERGENCE_FLAGS.with_label_values(&[tick.symbol().as_str()]).inc();
            debug!(
                symbol = %tick.symbol(),
                source = %tick.source(),
                price = %tick.price(),
                other_price = %d.other_price,
                delta_pct = d.delta * 100.0,
                "CROSS_SOURCE_DIVERGENCE"
            );
        }

        // Rule 5: jump guard against the previous accepted price
        if let Err(trip) = self.breaker.check(tick.source(), tick.symbol(), tick.price()) {
            return Err(Rejection {
                reason: RejectReason::CircuitBreaker,
                detail: format!(
                    "moved {:.2}% from {}{}",
                    trip.movement * 100.0,
                    trip.reference,
                    if trip.rebaselined { "; baseline reset" } else { "" }
                ),
            });
        }

        Ok(divergence)
    }

    fn divergence(&self, tick: &PriceTick, received_at: Timestamp) -> Option<Divergence> {
        let other_source = tick.source().other();
        let other = self.last_accepted.get(&(other_source, tick.symbol().clone()))?;
        if received_at.saturating_since(other.received_at) > self.config.divergence_window() {
            return None;
        }
        let delta = tick.price().relative_delta(other.price)?;
        (delta > self.config.divergence_warn_pct).then_some(Divergence {
            other_source,
            other_price: other.price,
            delta,
        })
    }
}
