//! Durable state for a Denaro node: the committed chain, the UTXO set, the
//! pending transaction pool, and the peer table.
//!
//! The storage engine is sled. The relational schema contract maps onto key
//! prefixes (see `disk_format`); the unit-of-work guarantee comes from sled
//! transactions spanning the chain and mempool trees.

#[macro_use]
extern crate serde;

mod disk_format;
mod error;
mod ledger;
pub mod mempool;
pub mod util;

use std::path::PathBuf;

use denaro_chain::block::{self, Height};
use denaro_chain::parameters::Network;

pub use error::StateError;
pub use ledger::{LedgerState, PeerStore};
pub use mempool::{Mempool, MempoolEntry, MAX_MEMPOOL_SIZE, MEMPOOL_EXPIRY_SECS};

/// Configuration for the state service.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The root directory for the node's databases. One subdirectory is
    /// created per database name and network.
    pub cache_dir: PathBuf,

    /// The database name, from `DENARO_DATABASE_NAME`.
    pub database_name: String,

    /// When true the database is backed by a temporary location and deleted
    /// on drop. Used by tests and `denarod --ephemeral`.
    pub ephemeral: bool,
}

impl Config {
    pub(crate) fn db_path(&self, network: Network) -> PathBuf {
        self.cache_dir
            .join(&self.database_name)
            .join(network.to_string())
    }

    pub(crate) fn sled_config(&self, network: Network) -> sled::Config {
        let config = sled::Config::default();
        if self.ephemeral {
            config.temporary(true)
        } else {
            config.path(self.db_path(network))
        }
    }

    /// An ephemeral config for tests.
    pub fn ephemeral() -> Config {
        Config {
            ephemeral: true,
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| std::path::PathBuf::from(".cache"))
            .join("denaro");
        Config {
            cache_dir,
            database_name: "denaro".to_string(),
            ephemeral: false,
        }
    }
}

/// A block identifier: either a hash or a height.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashOrHeight {
    Hash(block::Hash),
    Height(Height),
}

impl From<block::Hash> for HashOrHeight {
    fn from(hash: block::Hash) -> Self {
        HashOrHeight::Hash(hash)
    }
}

impl From<Height> for HashOrHeight {
    fn from(height: Height) -> Self {
        HashOrHeight::Height(height)
    }
}
