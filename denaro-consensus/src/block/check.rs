//! Contextual and structural block checks.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use denaro_chain::block::{self, Block, Header, MAX_BLOCK_BYTES, MAX_BLOCK_HEX, MAX_TX_DATA_HEX};
use denaro_chain::parameters::ConsensusVersion;
use denaro_chain::transaction::{self, Transaction};
use denaro_chain::work::difficulty::{satisfies_difficulty, Difficulty};
use denaro_chain::DenaroSerialize;

use crate::error::BlockError;

/// Returns the coinbase if there is exactly one, in first position.
pub fn coinbase_is_first(block: &Block) -> Result<&Arc<Transaction>, BlockError> {
    let first = block.transactions.get(0).ok_or(BlockError::NoTransactions)?;
    if !first.is_coinbase() {
        return Err(BlockError::CoinbasePosition);
    }
    if block.transactions.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(BlockError::CoinbasePosition);
    }
    Ok(first)
}

/// Check the merkle commitment, and reject duplicate transactions.
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();
    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }

    // The flat commitment already binds order, but duplicates imply an
    // in-block double spend, so reject them by name.
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Enforce the three serialized-size budgets.
pub fn size_limits(block: &Block) -> Result<(), BlockError> {
    let raw = block
        .denaro_serialize_to_vec()
        .map_err(|_| BlockError::TooLarge("raw"))?
        .len();
    if raw as u64 > MAX_BLOCK_BYTES {
        return Err(BlockError::TooLarge("raw"));
    }
    if raw * 2 > MAX_BLOCK_HEX {
        return Err(BlockError::TooLarge("hex"));
    }
    if block.tx_data_hex_len() > MAX_TX_DATA_HEX {
        return Err(BlockError::TooLarge("transaction data"));
    }
    Ok(())
}

/// The declared difficulty must equal the retarget schedule exactly.
pub fn difficulty_claim(expected: Difficulty, header: &Header) -> Result<(), BlockError> {
    if header.difficulty != expected {
        return Err(BlockError::BadDifficulty {
            expected,
            actual: header.difficulty,
        });
    }
    Ok(())
}

/// The hash must satisfy the fractional-difficulty predicate against the
/// parent hash.
pub fn pow_is_valid(parent_hash: &block::Hash, header: &Header) -> Result<(), BlockError> {
    let hash = header.hash();
    if !satisfies_difficulty(parent_hash, &hash, header.difficulty) {
        return Err(BlockError::PoWInvalid(hash));
    }
    Ok(())
}

/// Timestamps never regress along the chain and never run further ahead of
/// this node's clock than the consensus version tolerates.
pub fn time_is_valid(
    header: &Header,
    parent_timestamp: u64,
    now: DateTime<Utc>,
    version: ConsensusVersion,
) -> Result<(), BlockError> {
    if header.timestamp < parent_timestamp {
        return Err(BlockError::TimeRegression {
            actual: header.timestamp,
            parent: parent_timestamp,
        });
    }
    let limit = (now + version.timestamp_tolerance()).timestamp().max(0) as u64;
    if header.timestamp > limit {
        return Err(BlockError::TimeTooFarAhead {
            actual: header.timestamp,
            limit,
        });
    }
    Ok(())
}
