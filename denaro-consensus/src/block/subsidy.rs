//! The block reward schedule.

use denaro_chain::amount::{Amount, MAX_MONEY};
use denaro_chain::block::Height;

use crate::parameters::{HALVING_INTERVAL, MAX_BLOCK_REWARD, MAX_HALVINGS};

/// The reward minted by the block at `height`, given the supply already in
/// circulation.
///
/// The reward starts at 64 coins and halves every 262144 blocks. It is zero
/// once 64 halvings have passed, and zero earlier if minting it would push
/// the supply past the monetary cap. Because the cap equals the limit of the
/// halving series, the second condition only fires if the schedule and the
/// recorded supply ever disagree.
pub fn block_reward(height: Height, supply: Amount) -> Amount {
    let halvings = (height.0 - 1) / HALVING_INTERVAL.0;
    if halvings >= MAX_HALVINGS {
        return Amount::ZERO;
    }
    let reward = Amount::from_units(MAX_BLOCK_REWARD >> halvings)
        .expect("a right-shifted positive constant stays in range");

    match supply.checked_add(reward) {
        Ok(total) if total.units() <= MAX_MONEY => reward,
        _ => Amount::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_halves_on_the_interval() {
        let supply = Amount::ZERO;
        assert_eq!(
            block_reward(Height(1), supply),
            Amount::from_coins(64).unwrap()
        );
        assert_eq!(
            block_reward(HALVING_INTERVAL, supply),
            Amount::from_coins(64).unwrap()
        );
        // The block after the first full interval pays half.
        assert_eq!(
            block_reward(Height(HALVING_INTERVAL.0 + 1), supply),
            Amount::from_coins(32).unwrap()
        );
        assert_eq!(
            block_reward(Height(2 * HALVING_INTERVAL.0 + 1), supply),
            Amount::from_coins(16).unwrap()
        );
    }

    #[test]
    fn reward_reaches_zero() {
        let supply = Amount::ZERO;
        // Integer halving of 64 coins in smallest units bottoms out long
        // before the 64th halving.
        assert_eq!(
            block_reward(Height(27 * HALVING_INTERVAL.0 + 1), supply),
            Amount::ZERO
        );
        assert_eq!(
            block_reward(Height(64 * HALVING_INTERVAL.0 + 1), supply),
            Amount::ZERO
        );
    }

    #[test]
    fn reward_respects_the_monetary_cap() {
        let nearly_all = Amount::from_units(MAX_MONEY - 1).unwrap();
        assert_eq!(block_reward(Height(1), nearly_all), Amount::ZERO);

        let exactly_room = Amount::from_units(MAX_MONEY - 64 * denaro_chain::amount::COIN).unwrap();
        assert_eq!(
            block_reward(Height(1), exactly_room),
            Amount::from_coins(64).unwrap()
        );
    }
}
