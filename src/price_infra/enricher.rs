use std::sync::Arc;
use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::debug;
use crate::interfaces::previous_close::PreviousCloseLookup;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::tick::PriceTick;

/// Fills the change fields of ticks whose upstream left them out, using the
/// previous session close. Shared by both ingestion workers.
#[derive(Clone, Default)]
pub struct TickEnricher {
    lookup: Option<Arc<dyn PreviousCloseLookup>>,
    cache: Arc<DashMap<(Symbol, NaiveDate), Option<Price>>>,
}

impl TickEnricher {
    pub fn new(lookup: Arc<dyn PreviousCloseLookup>) -> Self {
        TickEnricher {
            lookup: Some(lookup),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Enricher that never touches ticks.
    pub fn disabled() -> Self {
        TickEnricher::default()
    }

    pub async fn enrich(&self, tick: PriceTick) -> PriceTick {
        if tick.has_change() {
            return tick;
        }
        let Some(lookup) = &self.lookup else {
            return tick;
        };
        let Some(date) = tick.timestamp().date() else {
            return tick;
        };

        let key = (tick.symbol().clone(), date);
        let close = match self.cache.get(&key).map(|entry| *entry) {
            Some(cached) => cached,
            None => match lookup.previous_close(tick.symbol(), date).await {
                Ok(close) => {
                    self.cache.insert(key, close);
                    close
                }
                Err(e) => {
                    debug!(symbol = %tick.symbol(), error = %e, "Previous close unavailable");
                    return tick;
                }
            },
        };

        match close {
            Some(close) if close.is_positive() => {
                let change = tick.price() - close;
                let percent = change.to_f64() / close.to_f64() * 100.0;
                tick.with_change(Some(change), Some(percent))
            }
            _ => tick,
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
