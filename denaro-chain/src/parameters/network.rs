use crate::work::difficulty::Difficulty;

/// A Denaro network.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// The production ledger.
    Mainnet,
    /// A local network for integration tests and development, identical to
    /// mainnet except that mining a block takes a handful of hash attempts.
    Regtest,
}

impl Network {
    /// The difficulty of the genesis block and of every block until the
    /// first retarget window closes.
    pub fn start_difficulty(self) -> Difficulty {
        match self {
            Network::Mainnet => Difficulty::from_tenths(60),
            Network::Regtest => Difficulty::from_tenths(10),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Regtest => f.write_str("regtest"),
        }
    }
}
