use crate::types::errors::MonetaryError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::str::FromStr;
use tracing::error;

const DECIMAL_PLACES: u32 = 2;

/// A non-negative amount of money with cent precision.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Monetary(Decimal);

impl Monetary {
    pub const ZERO: Monetary = Monetary(Decimal::ZERO);

    /// Wraps a decimal, rejecting negatives and anything finer than a cent.
    pub fn new(value: Decimal) -> Result<Self, MonetaryError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MonetaryError::Negative);
        }

        if value.normalize().scale() > DECIMAL_PLACES {
            return Err(MonetaryError::InvalidFormat("Value has too many decimal places".to_string()));
        }

        Ok(Monetary(value.normalize()))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Monetary) -> Option<Monetary> {
        self.0.checked_add(rhs.0).map(Monetary)
    }

    /// Subtracts `rhs`, returning `None` instead of going below zero.
    pub fn checked_sub(self, rhs: Monetary) -> Option<Monetary> {
        if rhs.0 > self.0 {
            return None;
        }

        self.0.checked_sub(rhs.0).map(Monetary)
    }

    pub fn saturating_sub(self, rhs: Monetary) -> Monetary {
        self.checked_sub(rhs).unwrap_or(Monetary::ZERO)
    }

    /// `self * rate / 100`, rounded to the cent with banker's rounding.
    pub fn percent(self, rate: Rate) -> Result<Monetary, MonetaryError> {
        let product = self.0.checked_mul(rate.0)
            .and_then(|value| value.checked_div(Decimal::ONE_HUNDRED))
            .ok_or(MonetaryError::Overflow)?;

        Ok(Monetary(product.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointNearestEven).normalize()))
    }
}

impl Sum for Monetary {
    fn sum<I: Iterator<Item = Monetary>>(iter: I) -> Self {
        iter.fold(Monetary::ZERO, |total, amount| {
            total.checked_add(amount).unwrap_or_else(|| {
                error!("Monetary Sum error: Overflow");
                total
            })
        })
    }
}

impl Display for Monetary {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        value.rescale(DECIMAL_PLACES);
        write!(formatter, "{value}")
    }
}

impl FromStr for Monetary {
    type Err = MonetaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if value.is_empty() {
            return Err(MonetaryError::InvalidFormat("Value is an empty string".to_string()));
        }

        let decimal = Decimal::from_str(value).map_err(|error| {
            MonetaryError::InvalidFormat(format!("Value [{value}] is not a decimal: {error}"))
        })?;

        Monetary::new(decimal)
    }
}

impl Serialize for Monetary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Monetary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Monetary::from_str(&value).map_err(de::Error::custom)
    }
}

/// A percentage between 0 and 100 inclusive.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(percent: Decimal) -> Result<Self, MonetaryError> {
        if percent.is_sign_negative() && !percent.is_zero() || percent > Decimal::ONE_HUNDRED {
            return Err(MonetaryError::InvalidRate(format!("Rate [{percent}] is outside 0..=100")));
        }

        Ok(Rate(percent.normalize()))
    }

    pub fn zero() -> Self {
        Rate(Decimal::ZERO)
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }
}

impl Display for Rate {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}%", self.0)
    }
}

impl FromStr for Rate {
    type Err = MonetaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().trim_end_matches('%');

        let decimal = Decimal::from_str(value).map_err(|error| {
            MonetaryError::InvalidRate(format!("Rate [{value}] is not a decimal: {error}"))
        })?;

        Rate::new(decimal)
    }
}

impl Serialize for Rate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Rate::from_str(&value).map_err(de::Error::custom)
    }
}
