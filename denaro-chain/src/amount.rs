//! Fixed-point coin amounts.
//!
//! All on-chain arithmetic happens in integer smallest units, where one coin
//! is one million units. The external representation is a decimal string with
//! six fractional digits. Arithmetic is checked; amounts never go negative.

use std::{fmt, iter, str::FromStr};

use serde::Deserialize;
use thiserror::Error;

use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

/// Smallest units per coin: amounts have exactly six fractional digits.
pub const COIN: i64 = 1_000_000;

/// The monetary cap, in smallest units. The emission schedule converges to
/// this value exactly: 64 coins halving every 262144 blocks sums to 2^25.
pub const MAX_MONEY: i64 = 33_554_432 * COIN;

/// A non-negative quantity of smallest units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount overflowed during arithmetic")]
    Overflow,
    #[error("amount would be negative")]
    Negative,
    #[error("malformed decimal amount: {0}")]
    Malformed(&'static str),
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build an amount from raw smallest units.
    pub fn from_units(units: i64) -> Result<Amount, AmountError> {
        if units < 0 {
            return Err(AmountError::Negative);
        }
        Ok(Amount(units))
    }

    /// Build an amount from a whole number of coins.
    pub fn from_coins(coins: i64) -> Result<Amount, AmountError> {
        let units = coins.checked_mul(COIN).ok_or(AmountError::Overflow)?;
        Amount::from_units(units)
    }

    pub fn units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        if rhs.0 > self.0 {
            return Err(AmountError::Negative);
        }
        Ok(Amount(self.0 - rhs.0))
    }

    /// Checked sum over an iterator of amounts.
    pub fn sum<I>(amounts: I) -> Result<Amount, AmountError>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, Amount::checked_add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / COIN, self.0 % COIN)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 6 {
            return Err(AmountError::Malformed(
                "expected at most six fractional digits",
            ));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::Malformed("expected an unsigned decimal"));
        }
        let whole: i64 = whole
            .parse()
            .map_err(|_| AmountError::Malformed("integer part out of range"))?;
        // Missing fractional digits are trailing zeros.
        let frac: i64 = frac
            .bytes()
            .chain(iter::repeat(b'0'))
            .take(6)
            .fold(0i64, |acc, digit| acc * 10 + (digit - b'0') as i64);
        let units = whole
            .checked_mul(COIN)
            .and_then(|w| w.checked_add(frac))
            .ok_or(AmountError::Overflow)?;
        Amount::from_units(units)
    }
}

impl serde::Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl DenaroSerialize for Amount {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        (self.0 as u64).denaro_serialize(&mut target)
    }
}

impl DenaroDeserialize for Amount {
    fn denaro_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let units = u64::denaro_deserialize(&mut reader)?;
        if units > i64::MAX as u64 {
            return Err(SerializationError::Parse("amount exceeds 63 bits"));
        }
        Ok(Amount(units as i64))
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl proptest::arbitrary::Arbitrary for Amount {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        (0..=MAX_MONEY).prop_map(Amount).boxed()
    }

    type Strategy = proptest::strategy::BoxedStrategy<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_roundtrip() {
        for raw in ["0.000001", "1.000000", "64.000000", "33554432.000000"] {
            let amount: Amount = raw.parse().unwrap();
            assert_eq!(amount.to_string(), raw);
        }
    }

    #[test]
    fn short_fractions_extend() {
        let amount: Amount = "1.5".parse().unwrap();
        assert_eq!(amount.units(), 1_500_000);
        let amount: Amount = "3".parse().unwrap();
        assert_eq!(amount.units(), 3 * COIN);
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", ".", "-1", "1.0000001", "1.2.3", "a"] {
            assert!(raw.parse::<Amount>().is_err(), "{:?} should not parse", raw);
        }
    }

    #[test]
    fn subtraction_cannot_go_negative() {
        let one = Amount::from_units(1).unwrap();
        assert_eq!(Amount::ZERO.checked_sub(one), Err(AmountError::Negative));
    }

    #[test]
    fn sum_overflow_detected() {
        let max = Amount::from_units(i64::MAX).unwrap();
        assert_eq!(
            Amount::sum(vec![max, Amount::from_units(1).unwrap()]),
            Err(AmountError::Overflow)
        );
    }
}
