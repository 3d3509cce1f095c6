use std::collections::HashMap;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::tick::TickSource;
use crate::utils::helper::alert_operations_team_critical;

#[derive(Clone, Debug, PartialEq)]
pub struct CircuitTrip {
    pub movement: f64,
    pub reference: Price,
    /// The symbol's baseline was dropped after this trip.
    pub rebaselined: bool,
}

/// Per-symbol jump guard. A tick moving more than `threshold` away from the
/// last accepted price of the symbol, whichever source supplied it, is
/// rejected. Trip streaks are counted per source so a run of bad prints from
/// one feed is what drops the baseline.
pub struct PriceCircuitBreaker {
    threshold: f64,
    rebaseline_after: u32,
    baselines: HashMap<Symbol, Price>,
    consecutive_trips: HashMap<(TickSource, Symbol), u32>,
    total_trips: u64,
}

impl PriceCircuitBreaker {
    pub fn new(threshold: f64, rebaseline_after: u32) -> Self {
        PriceCircuitBreaker {
            threshold,
            rebaseline_after: rebaseline_after.max(1),
            baselines: HashMap::new(),
            consecutive_trips: HashMap::new(),
            total_trips: 0,
        }
    }

    pub fn check(&mut self, source: TickSource, symbol: &Symbol, price: Price) -> Result<(), CircuitTrip> {
        let Some(reference) = self.baselines.get(symbol).copied() else {
            return Ok(());
        };
        let Some(movement) = price.relative_delta(reference) else {
            return Ok(());
        };
        if movement <= self.threshold {
            return Ok(());
        }

        self.total_trips += 1;
        let trips = self.consecutive_trips.entry((source, symbol.clone())).or_insert(0);
        *trips += 1;

        let rebaselined = *trips >= self.rebaseline_after;
        if rebaselined {
            self.baselines.remove(symbol);
            self.consecutive_trips.retain(|(_, s), _| s != symbol);
            tracing::warn!(
                source = %source,
                symbol = %symbol,
                "Circuit breaker baseline dropped after {} consecutive trips",
                self.rebaseline_after
            );
        }

        alert_operations_team_critical(format!(
            "Price circuit breaker triggered: {} {} moved {:.2}% from {} to {}",
            source,
            symbol,
            movement * 100.0,
            reference,
            price
        ));

        Err(CircuitTrip { movement, reference, rebaselined })
    }

    pub fn record_accepted(&mut self, source: TickSource, symbol: &Symbol, price: Price) {
        self.consecutive_trips.remove(&(source, symbol.clone()));
        self.baselines.insert(symbol.clone(), price);
    }

    pub fn baseline(&self, symbol: &Symbol) -> Option<Price> {
        self.baselines.get(symbol).copied()
    }

    pub fn total_trips(&self) -> u64 {
        self.total_trips
    }
}
