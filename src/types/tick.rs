use serde::{Deserialize, Serialize};
use std::fmt;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::timestamp::Timestamp;
use crate::types::volume::Volume;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickSource {
    Primary,
    Secondary,
}

impl TickSource {
    pub const ALL: [TickSource; 2] = [TickSource::Primary, TickSource::Secondary];

    pub fn quality_score(&self) -> u8 {
        match self {
            TickSource::Primary => 100,
            TickSource::Secondary => 50,
        }
    }

    pub fn is_real_time(&self) -> bool {
        matches!(self, TickSource::Primary)
    }

    pub fn other(&self) -> TickSource {
        match self {
            TickSource::Primary => TickSource::Secondary,
            TickSource::Secondary => TickSource::Primary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TickSource::Primary => "primary",
            TickSource::Secondary => "secondary",
        }
    }
}

impl fmt::Display for TickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single price observation. Immutable once built: fields are private and
/// corrections are represented by a new tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    symbol: Symbol,
    price: Price,
    price_change: Option<Price>,
    price_change_percent: Option<f64>,
    volume: Volume,
    timestamp: Timestamp,
    source: TickSource,
    quality_score: u8,
    is_real_time: bool,
}

impl PriceTick {
    /// Builds a tick; quality score and real-time flag follow from `source`.
    pub fn new(
        symbol: Symbol,
        price: Price,
        volume: Volume,
        timestamp: Timestamp,
        source: TickSource,
    ) -> Self {
        PriceTick {
            symbol,
            price,
            price_change: None,
            price_change_percent: None,
            volume,
            timestamp,
            source,
            quality_score: source.quality_score(),
            is_real_time: source.is_real_time(),
        }
    }

    /// Returns a copy carrying the given change fields.
    pub fn with_change(mut self, change: Option<Price>, change_percent: Option<f64>) -> Self {
        self.price_change = change;
        self.price_change_percent = change_percent.filter(|p| p.is_finite());
        self
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn price_change(&self) -> Option<Price> {
        self.price_change
    }

    pub fn price_change_percent(&self) -> Option<f64> {
        self.price_change_percent
    }

    pub fn has_change(&self) -> bool {
        self.price_change.is_some()
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn source(&self) -> TickSource {
        self.source
    }

    pub fn quality_score(&self) -> u8 {
        self.quality_score
    }

    pub fn is_real_time(&self) -> bool {
        self.is_real_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_determines_quality_and_real_time() {
        let symbol = Symbol::new("AAPL").unwrap();
        let primary = PriceTick::new(
            symbol.clone(),
            Price::from_f64(150.0),
            Volume::from_units(10),
            Timestamp::from_millis(1),
            TickSource::Primary,
        );
        let secondary = PriceTick::new(
            symbol,
            Price::from_f64(150.0),
            Volume::from_units(10),
            Timestamp::from_millis(1),
            TickSource::Secondary,
        );
        assert!(primary.is_real_time());
        assert!(!secondary.is_real_time());
        assert!(primary.quality_score() > secondary.quality_score());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let tick = PriceTick::new(
            Symbol::new("AAPL").unwrap(),
            Price::from_f64(150.5),
            Volume::from_units(3),
            Timestamp::from_millis(42),
            TickSource::Secondary,
        )
        .with_change(Some(Price::from_f64(0.5)), Some(0.33));

        let json = serde_json::to_value(&tick).unwrap();
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["price"], 150.5);
        assert_eq!(json["priceChange"], 0.5);
        assert_eq!(json["source"], "SECONDARY");
        assert_eq!(json["qualityScore"], 50);
        assert_eq!(json["isRealTime"], false);
        assert_eq!(json["timestamp"], 42);
    }
}
