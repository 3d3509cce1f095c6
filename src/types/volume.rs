use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use crate::types::price::{write_fixed, FixedVisitor, MULTIPLIER};

/// Traded volume in 8-place fixed point. Fractional volumes are common on
/// crypto venues, so this is not an integer share count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Volume(i64);

impl Volume {
    pub fn from_i64(value: i64) -> Self {
        Volume(value)
    }

    pub fn from_units(units: i64) -> Self {
        Volume(units.saturating_mul(MULTIPLIER))
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / MULTIPLIER as f64
    }

    pub fn zero() -> Self {
        Volume(0)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fixed(f, self.0)
    }
}

impl Serialize for Volume {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Volume {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor).map(Volume)
    }
}
