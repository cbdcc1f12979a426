//! Integer currency amounts in minor units (cents).
//!
//! Balances are stored as whole minor units so fee arithmetic never touches
//! floating point. Parsing and display go through `rust_decimal` at a fixed
//! scale of 2.

use crate::error::LibraryError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A signed amount of money held as minor units.
///
/// The representation matches the on-disk balance field (`i32`), so every
/// value of this type can be persisted.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use libsys::Money;
///
/// let fee = Money::from_str("0.3").unwrap();
/// assert_eq!(fee.minor(), 30);
/// assert_eq!(fee.to_string(), "0.30");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i32);

impl Money {
    /// Number of decimal places in the major unit.
    pub const SCALE: u32 = 2;

    /// Zero value.
    pub const ZERO: Self = Money(0);

    /// Creates an amount from minor units.
    pub const fn from_minor(minor: i32) -> Self {
        Money(minor)
    }

    /// Returns the amount in minor units.
    pub const fn minor(self) -> i32 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Multiplies by a whole factor, e.g. a per-day rate by a day count.
    pub fn checked_mul(self, factor: i64) -> Option<Money> {
        i64::from(self.0)
            .checked_mul(factor)
            .and_then(|v| i32::try_from(v).ok())
            .map(Money)
    }

    fn as_decimal(self) -> Decimal {
        Decimal::new(i64::from(self.0), Self::SCALE)
    }
}

impl FromStr for Money {
    type Err = LibraryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)
            .map_err(|e| LibraryError::invalid(format!("'{}' is not an amount: {}", trimmed, e)))?;

        let minor = decimal * Decimal::new(100, 0);
        if !minor.fract().is_zero() {
            return Err(LibraryError::invalid(format!(
                "'{}' has more than {} decimal places",
                trimmed,
                Self::SCALE
            )));
        }

        minor
            .to_i32()
            .map(Money)
            .ok_or_else(|| LibraryError::invalid(format!("'{}' is out of range", trimmed)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}
