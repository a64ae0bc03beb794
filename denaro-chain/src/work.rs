//! Proof-of-work accounting: difficulty values and cumulative chain work.

pub mod difficulty;

use std::iter::Sum;
use std::ops::Add;

use primitive_types::U256;

use self::difficulty::Difficulty;

/// Fixed-point table of `2^(j/10)` scaled by `2^16`, for `j` in `0..10`.
///
/// Chain work must be compared with exact integer arithmetic so fork choice is
/// identical on every platform; this table turns the fractional part of a
/// difficulty into an integer multiplier.
const FRAC_POW2: [u64; 10] = [
    65536, 70239, 75281, 80684, 86475, 92681, 99334, 106463, 114104, 122294,
];

/// The expected number of hash evaluations behind a block or chain,
/// `16^difficulty` accumulated, carried at a constant `2^16` fixed-point
/// scale. Only sums and comparisons of `Work` values are meaningful, so the
/// scale never needs to be divided out and no precision is lost at low
/// difficulties.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(U256);

impl Work {
    pub fn zero() -> Work {
        Work(U256::zero())
    }

    /// Expected work for a single block mined at `difficulty`.
    pub fn expected(difficulty: Difficulty) -> Work {
        let exponent = 4 * difficulty.tenths() as usize;
        let bits = exponent / 10;
        // 2^239 * the largest table entry still fits in a U256.
        if bits > 239 {
            return Work(U256::MAX);
        }
        Work(U256::from(FRAC_POW2[exponent % 10]) << bits)
    }
}

impl Add for Work {
    type Output = Work;

    fn add(self, rhs: Work) -> Work {
        Work(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Work {
    fn sum<I: Iterator<Item = Work>>(iter: I) -> Work {
        iter.fold(Work::zero(), Add::add)
    }
}
