//! Consensus version activation parameters.

use std::collections::BTreeMap;

use chrono::Duration;

use crate::block::Height;
use crate::parameters::Network;

use ConsensusVersion::*;

/// The target spacing between blocks, in seconds.
pub const TARGET_BLOCK_TIME_SECS: i64 = 180;

/// Difficulty is recomputed every this many blocks.
pub const RETARGET_INTERVAL: u32 = 512;

/// A Denaro consensus version.
///
/// Consensus versions change validation rules in incompatible ways. Each
/// activates at a fixed height and stays in force until the next activation;
/// activation heights are inclusive bounds.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum ConsensusVersion {
    /// The rules in force from the genesis block.
    V0,
    /// Tightens the timestamp skew bound and rejects high-`s` signatures.
    V1,
}

/// Mainnet consensus version activation heights.
///
/// This is actually a bijective map, but it is const, so we use a slice, and
/// do the uniqueness check in the unit tests.
pub(crate) const MAINNET_ACTIVATION_HEIGHTS: &[(Height, ConsensusVersion)] =
    &[(Height(1), V0), (Height(524_288), V1)];

/// Regtest consensus version activation heights, compressed so integration
/// tests can cross the V1 boundary without mining half a million blocks.
pub(crate) const REGTEST_ACTIVATION_HEIGHTS: &[(Height, ConsensusVersion)] =
    &[(Height(1), V0), (Height(128), V1)];

impl ConsensusVersion {
    /// Returns a map of activation heights to consensus versions for
    /// `network`.
    pub(crate) fn activation_list(network: Network) -> BTreeMap<Height, ConsensusVersion> {
        match network {
            Network::Mainnet => MAINNET_ACTIVATION_HEIGHTS,
            Network::Regtest => REGTEST_ACTIVATION_HEIGHTS,
        }
        .iter()
        .cloned()
        .collect()
    }

    /// Returns the consensus version in force for `network` at `height`.
    pub fn current(network: Network, height: Height) -> ConsensusVersion {
        ConsensusVersion::activation_list(network)
            .range(..=height)
            .map(|(_, version)| *version)
            .next_back()
            .expect("every valid height has a consensus version")
    }

    /// Returns the activation height of this version on `network`, if any.
    pub fn activation_height(&self, network: Network) -> Option<Height> {
        ConsensusVersion::activation_list(network)
            .iter()
            .find(|(_, version)| **version == *self)
            .map(|(height, _)| *height)
    }

    /// How far into the future a block timestamp may run ahead of this
    /// node's clock.
    pub fn timestamp_tolerance(&self) -> Duration {
        match self {
            V0 => Duration::seconds(60),
            V1 => Duration::seconds(30),
        }
    }

    /// Whether high-`s` ECDSA signatures are rejected.
    pub fn strict_low_s(&self) -> bool {
        match self {
            V0 => false,
            V1 => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_heights_are_unique_and_sorted() {
        for heights in [MAINNET_ACTIVATION_HEIGHTS, REGTEST_ACTIVATION_HEIGHTS] {
            let mut sorted: Vec<_> = heights.iter().map(|(h, _)| *h).collect();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), heights.len());
        }
    }

    #[test]
    fn activations_are_inclusive_bounds() {
        let boundary = V1.activation_height(Network::Mainnet).unwrap();
        assert_eq!(
            ConsensusVersion::current(Network::Mainnet, Height(boundary.0 - 1)),
            V0
        );
        assert_eq!(ConsensusVersion::current(Network::Mainnet, boundary), V1);
    }

    #[test]
    fn genesis_runs_v0() {
        assert_eq!(ConsensusVersion::current(Network::Mainnet, Height::MIN), V0);
        assert_eq!(ConsensusVersion::current(Network::Regtest, Height::MIN), V0);
    }
}
