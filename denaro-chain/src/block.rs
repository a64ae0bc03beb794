//! Blocks and block-related structures (heights, headers, hashes).

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

pub use hash::Hash;
pub use header::Header;
pub use height::Height;
pub use serialize::{MAX_BLOCK_BYTES, MAX_BLOCK_HEX, MAX_TX_DATA_HEX};

use crate::amount::{Amount, AmountError};
use crate::fmt::DisplayToDebug;
use crate::transaction::Transaction;

/// A Denaro block: a header and the transactions it commits to.
///
/// The first transaction is always the coinbase; the header's merkle root
/// binds the full ordered list of transaction hashes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions, coinbase first.
    pub transactions: Vec<Arc<Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("hash", &DisplayToDebug(self.hash()))
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl Block {
    /// Compute (or fetch the cached) hash of this block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The coinbase transaction, if the block has one in first position.
    pub fn coinbase(&self) -> Option<&Arc<Transaction>> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Total fees declared by the non-coinbase transactions.
    pub fn fees(&self) -> Result<Amount, AmountError> {
        Amount::sum(
            self.transactions
                .iter()
                .filter(|tx| !tx.is_coinbase())
                .map(|tx| tx.fees),
        )
    }

    /// Combined hex length of the serialized transactions, the quantity the
    /// per-block transaction-data budget is measured in.
    pub fn tx_data_hex_len(&self) -> usize {
        self.transactions.iter().map(|tx| tx.hex_len()).sum()
    }
}
