//! Consensus parameters for each Denaro network.

mod consensus_version;
mod genesis;
mod network;

pub use consensus_version::{ConsensusVersion, RETARGET_INTERVAL, TARGET_BLOCK_TIME_SECS};
pub use genesis::GENESIS_PREVIOUS_BLOCK_HASH;
pub use network::Network;
