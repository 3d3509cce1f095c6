pub mod backoff;
pub mod circuit_breaker;
pub mod connectors;
pub mod enricher;
pub mod symbols;
pub mod validation;

use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::tick::{PriceTick, TickSource};
use crate::types::timestamp::Timestamp;
use crate::types::volume::Volume;

pub use backoff::Backoff;
pub use circuit_breaker::PriceCircuitBreaker;
pub use enricher::TickEnricher;
pub use symbols::SymbolWatcher;
pub use validation::{RejectReason, ValidationPipeline, Verdict};

/// Quote as decoded from either upstream, before it becomes a `PriceTick`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuote {
    pub symbol: String,
    pub price: Price,
    #[serde(default)]
    pub volume: Option<Volume>,
    #[serde(default)]
    pub change: Option<Price>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    /// Upstream generation time; receipt time is used when missing.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl RawQuote {
    pub fn into_tick(self, source: TickSource, received_at: Timestamp) -> Result<PriceTick> {
        let symbol = Symbol::new(&self.symbol)?;
        let tick = PriceTick::new(
            symbol,
            self.price,
            self.volume.unwrap_or_else(Volume::zero),
            self.timestamp.unwrap_or(received_at),
            source,
        );
        Ok(tick.with_change(self.change, self.change_percent))
    }
}
