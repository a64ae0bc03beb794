//! Constants for block rewards, reorganisation bounds, and bulk submission.

use denaro_chain::amount::COIN;
use denaro_chain::block::Height;

/// The reward before the first halving, in smallest units: 64 coins.
pub const MAX_BLOCK_REWARD: i64 = 64 * COIN;

/// Rewards halve every this many blocks.
pub const HALVING_INTERVAL: Height = Height(262_144);

/// After this many halvings the reward is zero outright.
pub const MAX_HALVINGS: u32 = 64;

/// The deepest suffix of the canonical chain a reorganisation may replace.
pub const MAX_REORG_DEPTH: u32 = 128;

/// Upper bound on blocks accepted by one bulk submission.
pub const MAX_BLOCKS_PER_SUBMISSION: usize = 512;

/// Upper bound on stashed side-branch blocks kept for fork choice.
pub const MAX_SIDE_BLOCKS: usize = 512;

/// How many times a unit of work is retried when storage reports itself
/// unavailable, and the initial backoff between attempts.
pub const STORAGE_RETRIES: u32 = 3;
pub const STORAGE_RETRY_BASE_MS: u64 = 100;
