//! Unsigned fixed-point amounts.
//!
//! All quantities and prices in the framework are expressed as [`UFix64`]: an unsigned decimal
//! with exactly [`DECIMALS`] fractional digits, stored as a count of the smallest unit. Every
//! multiplication and division truncates toward zero, so a computed withdrawal can never exceed
//! what the exact rational result would allow.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of fractional digits carried by [`UFix64`].
pub const DECIMALS: u32 = 8;

const SCALE: u64 = 100_000_000;

/// Unsigned fixed-point decimal with 8 fractional digits.
///
/// ```
/// use tributary_common::UFix64;
///
/// let amount: UFix64 = "12.5".parse().unwrap();
/// assert_eq!(amount.raw(), 1_250_000_000);
/// assert_eq!(amount.to_string(), "12.50000000");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UFix64(u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    #[error("Empty amount")]
    Empty,
    #[error("Invalid digit in amount: {0}")]
    InvalidDigit(String),
    #[error("Too many fractional digits in {0}, at most {DECIMALS} are supported")]
    TooPrecise(String),
    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}

impl UFix64 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(SCALE);
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an amount from its raw representation (count of 10^-8 units).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw representation (count of 10^-8 units).
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Creates an amount from a whole number of units.
    pub fn from_integer(value: u64) -> Option<Self> {
        value.checked_mul(SCALE).map(Self)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Multiplies two amounts, truncating the result toward zero.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let product = u128::from(self.0) * u128::from(rhs.0) / u128::from(SCALE);
        u64::try_from(product)
            .ok()
            .map(Self)
    }

    /// Divides two amounts, truncating the result toward zero.
    ///
    /// Returns `None` when dividing by zero or when the quotient does not fit.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.0 == 0 {
            return None;
        }
        let quotient = u128::from(self.0) * u128::from(SCALE) / u128::from(rhs.0);
        u64::try_from(quotient)
            .ok()
            .map(Self)
    }
}

impl fmt::Display for UFix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / SCALE, self.0 % SCALE)
    }
}

impl fmt::Debug for UFix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UFix64 {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseAmountError::Empty);
        }
        let (integer, fraction) = match s.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (s, ""),
        };
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if integer.is_empty() || !all_digits(integer) || !all_digits(fraction) {
            return Err(ParseAmountError::InvalidDigit(s.to_string()));
        }
        if fraction.len() > DECIMALS as usize {
            return Err(ParseAmountError::TooPrecise(s.to_string()));
        }

        let whole: u64 = integer
            .parse()
            .map_err(|_| ParseAmountError::OutOfRange(s.to_string()))?;
        let padded = format!("{fraction:0<width$}", width = DECIMALS as usize);
        let fractional: u64 = padded
            .parse()
            .map_err(|_| ParseAmountError::InvalidDigit(s.to_string()))?;

        whole
            .checked_mul(SCALE)
            .and_then(|scaled| scaled.checked_add(fractional))
            .map(Self)
            .ok_or_else(|| ParseAmountError::OutOfRange(s.to_string()))
    }
}

impl Serialize for UFix64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct UFix64Visitor;

impl<'de> de::Visitor<'de> for UFix64Visitor {
    type Value = UFix64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a non-negative decimal with at most {DECIMALS} fractional digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        UFix64::from_integer(v).ok_or_else(|| E::custom(ParseAmountError::OutOfRange(v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        let v = u64::try_from(v).map_err(|_| E::custom("amounts cannot be negative"))?;
        self.visit_u64(v)
    }

    // Config formats hand decimals over as floats; their shortest round-trip representation is
    // parsed so that e.g. `0.1` becomes exactly 0.10000000.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() || v.is_sign_negative() {
            return Err(E::custom(format!("invalid amount {v}")));
        }
        self.visit_str(&v.to_string())
    }
}

impl<'de> Deserialize<'de> for UFix64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UFix64Visitor)
    }
}
