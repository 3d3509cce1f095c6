use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Sub;
use std::fmt;

pub(crate) const DECIMALS: u32 = 8;
pub(crate) const MULTIPLIER: i64 = 100_000_000;  // 10^8

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(i64);  // Fixed-point with 8 decimal places

impl Price {
    pub fn from_i64(value: i64) -> Self {
        Price(value)
    }

    pub fn from_f64(value: f64) -> Self {
        Price((value * MULTIPLIER as f64).round() as i64)
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / MULTIPLIER as f64
    }

    pub fn zero() -> Self {
        Price(0)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Relative distance `|self - reference| / reference`.
    /// `None` when the reference is not a positive price.
    pub fn relative_delta(&self, reference: Price) -> Option<f64> {
        if reference.0 <= 0 {
            return None;
        }
        Some((self.0 as f64 - reference.0 as f64).abs() / reference.0 as f64)
    }
}

impl Sub for Price {
    type Output = Price;
    fn sub(self, other: Price) -> Price {
        Price(self.0 - other.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fixed(f, self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor).map(Price)
    }
}

/// Accepts JSON numbers or decimal strings; vendors disagree on which.
pub(crate) struct FixedVisitor;

impl<'de> Visitor<'de> for FixedVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal number or decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        v.checked_mul(MULTIPLIER).ok_or_else(|| E::custom("value out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(MULTIPLIER))
            .ok_or_else(|| E::custom("value out of range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        if !v.is_finite() {
            return Err(E::custom("non-finite value"));
        }
        Ok((v * MULTIPLIER as f64).round() as i64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        parse_fixed(v).ok_or_else(|| E::custom(format!("invalid decimal {:?}", v)))
    }
}

/// Exact decimal-string parse into 8-place fixed point. Extra fractional
/// digits beyond the eighth are truncated.
pub(crate) fn parse_fixed(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() {
        return None;
    }

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let int_value: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac_value: i64 = 0;
    for (i, c) in frac_part.chars().take(DECIMALS as usize).enumerate() {
        let digit = c.to_digit(10)? as i64;
        frac_value += digit * 10_i64.pow(DECIMALS - 1 - i as u32);
    }

    let raw = int_value.checked_mul(MULTIPLIER)?.checked_add(frac_value)?;
    Some(if negative { -raw } else { raw })
}

pub(crate) fn write_fixed(f: &mut fmt::Formatter<'_>, raw: i64) -> fmt::Result {
    let sign = if raw < 0 { "-" } else { "" };
    let abs = raw.unsigned_abs();
    let int_part = abs / MULTIPLIER as u64;
    let frac_part = abs % MULTIPLIER as u64;
    if frac_part == 0 {
        return write!(f, "{}{}", sign, int_part);
    }
    let frac = format!("{:08}", frac_part);
    write!(f, "{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
}
