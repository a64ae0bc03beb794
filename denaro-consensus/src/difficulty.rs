//! The difficulty retarget schedule.

use denaro_chain::parameters::{RETARGET_INTERVAL, TARGET_BLOCK_TIME_SECS};
use denaro_chain::work::difficulty::Difficulty;

/// Whether the block at `height` opens a new retarget window.
pub fn is_retarget_height(height: u32) -> bool {
    height > RETARGET_INTERVAL && (height - 1) % RETARGET_INTERVAL == 0
}

/// Recompute difficulty at a window boundary.
///
/// The adjustment is `log₂(target / actual)` over the elapsed time of the
/// closing window, clamped to one whole unit per retarget and rounded to one
/// decimal before it touches consensus state. A slower-than-target window
/// therefore lowers difficulty, a faster one raises it.
pub fn next_difficulty(
    previous: Difficulty,
    window_start_timestamp: u64,
    window_end_timestamp: u64,
) -> Difficulty {
    let actual = window_end_timestamp
        .saturating_sub(window_start_timestamp)
        .max(1) as f64;
    let target = (TARGET_BLOCK_TIME_SECS * RETARGET_INTERVAL as i64) as f64;

    let delta = (target / actual).log2().clamp(-1.0, 1.0);
    let tenths = (delta * 10.0).round() as i32;
    previous.saturating_add_tenths(tenths)
}
