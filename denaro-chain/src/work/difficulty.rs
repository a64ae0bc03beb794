//! Fractional difficulties and the hex-prefix predicate.
//!
//! A difficulty `d.f` requires a candidate block hash to start with the last
//! `d` hex characters of its parent's hash, and constrains the *next* hex
//! character to the first `⌈16·(1−f)⌉` characters of `0123456789abcdef`. Each
//! whole unit multiplies the search space by 16; each tenth by roughly 16^0.1.

use std::fmt;

use serde::Deserialize;

use crate::block;
use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

/// A difficulty value with one decimal digit of precision, stored in tenths.
///
/// Stored as tenths so consensus code never touches floating point: `6.3`
/// is `Difficulty(63)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Difficulty(u16);

/// The lowest difficulty the retarget schedule will ever emit.
pub const MIN_DIFFICULTY: Difficulty = Difficulty(10);

impl Difficulty {
    pub fn from_tenths(tenths: u16) -> Difficulty {
        Difficulty(tenths)
    }

    pub fn tenths(&self) -> u16 {
        self.0
    }

    /// The whole-unit part: how many hex characters of the parent hash the
    /// candidate must reproduce. Capped at the full hash length.
    pub fn integer_part(&self) -> usize {
        ((self.0 / 10) as usize).min(64)
    }

    fn frac_tenths(&self) -> u16 {
        self.0 % 10
    }

    /// How many of the 16 hex characters are allowed at the position after
    /// the required prefix: `⌈16·(1−f)⌉`.
    pub fn allowed_charset_len(&self) -> usize {
        let f = self.frac_tenths();
        if f == 0 {
            16
        } else {
            ((160 - 16 * f as usize) + 9) / 10
        }
    }

    /// Shift the difficulty by a signed number of tenths, flooring at the
    /// minimum difficulty.
    pub fn saturating_add_tenths(self, delta: i32) -> Difficulty {
        let shifted = (self.0 as i32 + delta).max(MIN_DIFFICULTY.0 as i32);
        Difficulty(shifted as u16)
    }
}

/// Evaluates the fractional-difficulty predicate.
///
/// `candidate` satisfies `difficulty` against `previous` iff its hex rendering
/// starts with the last `⌊difficulty⌋` hex characters of `previous`, and the
/// character at the following position falls inside the allowed charset.
pub fn satisfies_difficulty(
    previous: &block::Hash,
    candidate: &block::Hash,
    difficulty: Difficulty,
) -> bool {
    let previous = previous.to_hex();
    let candidate = candidate.to_hex();

    let prefix_len = difficulty.integer_part();
    let required = &previous[previous.len() - prefix_len..];
    if !candidate.starts_with(required) {
        return false;
    }

    let allowed = difficulty.allowed_charset_len();
    if allowed == 16 || prefix_len == 64 {
        return true;
    }
    let next = candidate.as_bytes()[prefix_len];
    let value = match next {
        b'0'..=b'9' => next - b'0',
        b'a'..=b'f' => next - b'a' + 10,
        _ => unreachable!("hex::encode produces lowercase hex"),
    };
    (value as usize) < allowed
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl std::str::FromStr for Difficulty {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s, "0"),
        };
        let whole: u16 = whole
            .parse()
            .map_err(|_| SerializationError::Parse("difficulty integer part"))?;
        if frac.len() != 1 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SerializationError::Parse(
                "difficulty must have one decimal digit",
            ));
        }
        let frac = (frac.as_bytes()[0] - b'0') as u16;
        whole
            .checked_mul(10)
            .and_then(|t| t.checked_add(frac))
            .map(Difficulty)
            .ok_or(SerializationError::Parse("difficulty out of range"))
    }
}

impl serde::Serialize for Difficulty {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 10.0)
    }
}

impl<'de> serde::Deserialize<'de> for Difficulty {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        let tenths = (value * 10.0).round();
        if !(0.0..=u16::MAX as f64).contains(&tenths) || (value * 10.0 - tenths).abs() > 1e-6 {
            return Err(serde::de::Error::custom(
                "difficulty must be a non-negative multiple of 0.1",
            ));
        }
        Ok(Difficulty(tenths as u16))
    }
}

impl DenaroSerialize for Difficulty {
    fn denaro_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.0.denaro_serialize(&mut writer)
    }
}

impl DenaroDeserialize for Difficulty {
    fn denaro_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Difficulty(u16::denaro_deserialize(&mut reader)?))
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl proptest::arbitrary::Arbitrary for Difficulty {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        (10u16..200).prop_map(Difficulty).boxed()
    }

    type Strategy = proptest::strategy::BoxedStrategy<Self>;
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn hash_from_hex(s: &str) -> block::Hash {
        block::Hash::from_str(s).unwrap()
    }

    // A parent hash ending in "abcdef" and candidates around it.
    const PARENT: &str = "1111111111111111111111111111111111111111111111111111111111abcdef";

    #[test]
    fn integer_difficulty_is_a_pure_prefix_rule() {
        let parent = hash_from_hex(PARENT);
        let good = hash_from_hex(&format!("abcdef{}", "0".repeat(58)));
        let bad = hash_from_hex(&format!("abcdee{}", "0".repeat(58)));

        let d = Difficulty::from_str("6.0").unwrap();
        assert!(satisfies_difficulty(&parent, &good, d));
        assert!(!satisfies_difficulty(&parent, &bad, d));
    }

    #[test]
    fn fractional_part_restricts_next_character() {
        let parent = hash_from_hex(PARENT);
        // After "abcdef", difficulty 6.5 allows the first 8 hex chars (0..=7).
        let d = Difficulty::from_str("6.5").unwrap();
        assert_eq!(d.allowed_charset_len(), 8);

        let low = hash_from_hex(&format!("abcdef7{}", "0".repeat(57)));
        let high = hash_from_hex(&format!("abcdef8{}", "0".repeat(57)));
        assert!(satisfies_difficulty(&parent, &low, d));
        assert!(!satisfies_difficulty(&parent, &high, d));
    }

    #[test]
    fn charset_widths_match_ceiling_formula() {
        // count = ⌈16·(1−f)⌉ for f in 0.0..=0.9
        let expected = [16, 15, 13, 12, 10, 8, 7, 5, 4, 2];
        for (frac, expected) in expected.iter().enumerate() {
            let d = Difficulty::from_tenths(60 + frac as u16);
            assert_eq!(d.allowed_charset_len(), *expected, "f=0.{}", frac);
        }
    }

    #[test]
    fn display_parse_roundtrip() {
        for raw in ["1.0", "6.0", "6.3", "12.9"] {
            let d = Difficulty::from_str(raw).unwrap();
            assert_eq!(d.to_string(), raw);
        }
    }

    #[test]
    fn retarget_floor() {
        assert_eq!(
            Difficulty::from_tenths(12).saturating_add_tenths(-10),
            MIN_DIFFICULTY
        );
    }
}
