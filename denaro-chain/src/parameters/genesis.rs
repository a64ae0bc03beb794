//! Genesis consensus parameters.

use crate::block;

/// The predecessor-hash sentinel for the genesis block, fixed by consensus
/// version 0.
///
/// Because the difficulty predicate reads the *tail* of this value, a genesis
/// candidate must hash to a string of leading zeros matching the start
/// difficulty.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);
