//! Fixed-point money in minor units.
//!
//! Amounts are held as integer cents so tranche arithmetic is exact. On the
//! wire a `Money` is a decimal string with two fractional digits ("1500.00").

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MINOR_PER_MAJOR: i64 = 100;

/// One basis point is 1/10_000.
pub const BPS_SCALE: u32 = 10_000;

/// Amount in minor units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    /// Convert a floating point amount, rounding to the nearest cent.
    /// Returns `None` for NaN, infinities and values that do not fit.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let minor = (value * MINOR_PER_MAJOR as f64).round();
        if minor.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self(minor as i64))
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Split into `(share, remainder)` where `share` is `bps` basis points of
    /// `self`, rounded down to the cent. `share + remainder == self` always.
    pub fn split_bps(self, bps: u32) -> (Money, Money) {
        let bps = i128::from(bps.min(BPS_SCALE));
        let share = (i128::from(self.0) * bps / i128::from(BPS_SCALE)) as i64;
        (Money(share), Money(self.0 - share))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid money amount `{input}`: {reason}")]
pub struct MoneyParseError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| MoneyParseError {
            input: s.to_string(),
            reason,
        };
        let trimmed = s.trim().trim_start_matches('$');
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(err("empty amount"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err("expected digits with an optional decimal point"));
        }
        if frac.len() > 2 {
            return Err(err("more than two fractional digits"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err("amount out of range"))?
        };
        let cents: i64 = format!("{frac:0<2}")
            .parse()
            .map_err(|_| err("invalid fractional part"))?;
        let minor = whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(cents))
            .ok_or_else(|| err("amount out of range"))?;

        Ok(Money(if negative { -minor } else { minor }))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
