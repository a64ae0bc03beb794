//! Utilities for chain reconciliation.

use denaro_chain::block::Height;

/// The probe heights of a block locator: the tip, then heights at
/// exponentially growing distances behind it, always ending at genesis.
///
/// For a tip at height `h` this is `[h, h−1, h−2, h−4, h−8, …, 1]`.
pub fn block_locator_heights(tip: Height) -> Vec<Height> {
    let mut heights = vec![tip];
    let mut offset: u32 = 1;
    while offset < tip.0 - 1 {
        heights.push(Height(tip.0 - offset));
        offset = offset.saturating_mul(2);
    }
    if tip.0 > 1 {
        heights.push(Height(1));
    }
    heights
}
