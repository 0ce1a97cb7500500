//! Non-negative monetary amount backed by rust_decimal.
//!
//! Serializes as a decimal string so computed charges are byte-stable across runs.

use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),
    #[error("invalid decimal {0:?}: {1}")]
    Parse(String, String),
}

/// Monetary amount. Always `>= 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    /// Wrap a decimal, rejecting negative values.
    pub fn try_new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }
        Ok(Amount(value))
    }

    /// Parse an amount from its decimal string form.
    pub fn from_str_canonical(s: &str) -> Result<Self, AmountError> {
        let value =
            Decimal::from_str(s).map_err(|e| AmountError::Parse(s.to_string(), e.to_string()))?;
        Self::try_new(value)
    }

    /// Format without exponent notation and without trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        self.0.normalize().to_string()
    }

    pub fn zero() -> Self {
        Amount(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// `self × numerator / denominator`, multiplying first to keep whole-day
    /// proration exact. A zero denominator yields zero.
    pub fn prorate(&self, numerator: i64, denominator: i64) -> Self {
        if denominator == 0 || numerator <= 0 {
            return Amount::zero();
        }
        Amount(self.0 * Decimal::from(numerator) / Decimal::from(denominator))
    }

    /// Multiply by a non-negative rate (e.g. a reduced suspension rate).
    pub fn scale_by(&self, rate: Decimal) -> Self {
        if rate.is_sign_negative() {
            return Amount::zero();
        }
        Amount(self.0 * rate)
    }

    /// Round half away from zero to `scale` fractional digits and pin the
    /// scale so `250` renders as `250.00` at scale 2.
    pub fn round_to(&self, scale: u32) -> Self {
        let mut rounded = self
            .0
            .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(scale);
        Amount(rounded)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::try_new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::str::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = rust_decimal::serde::str::deserialize(deserializer)?;
        Amount::try_new(value).map_err(serde::de::Error::custom)
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}
