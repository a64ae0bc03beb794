//! Shared helpers for engine integration tests: a regtest engine over an
//! ephemeral database, and a tiny miner.

use std::sync::Arc;

use chrono::Utc;

use denaro_chain::address::Address;
use denaro_chain::amount::Amount;
use denaro_chain::block::{self, Block, Header};
use denaro_chain::keys::SecretKey;
use denaro_chain::parameters::Network;
use denaro_chain::transaction::Transaction;
use denaro_chain::work::difficulty::{satisfies_difficulty, Difficulty};
use denaro_consensus::ChainEngine;
use denaro_state::{Config, LedgerState};

pub fn engine() -> ChainEngine {
    denaro_test::init();
    let ledger = LedgerState::new(&Config::ephemeral(), Network::Regtest)
        .expect("ephemeral state opens");
    ChainEngine::new(ledger, Network::Regtest)
}

pub fn keyed_address() -> (SecretKey, Address) {
    let key = SecretKey::generate();
    let address = Address::from(&key.public_key());
    (key, address)
}

pub fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Brute-force a nonce until the block satisfies its difficulty against
/// `previous`. Regtest difficulty needs a handful of attempts.
pub fn mine(
    previous: block::Hash,
    transactions: Vec<Arc<Transaction>>,
    miner: Address,
    difficulty: Difficulty,
    timestamp: u64,
) -> Arc<Block> {
    let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
    let mut header = Header::new(previous, merkle_root, miner, timestamp, difficulty, 0);
    while !satisfies_difficulty(&previous, &header.hash(), difficulty) {
        header.nonce += 1;
        header.invalidate_hash();
    }
    Arc::new(Block {
        header,
        transactions,
    })
}

/// Mine a block holding just a coinbase worth `value` paid to `miner`.
pub fn mine_coinbase_block(
    previous: block::Hash,
    miner: Address,
    value: Amount,
    difficulty: Difficulty,
    timestamp: u64,
) -> Arc<Block> {
    let coinbase = Arc::new(Transaction::coinbase(miner, value));
    mine(previous, vec![coinbase], miner, difficulty, timestamp)
}

pub fn regtest_difficulty() -> Difficulty {
    Network::Regtest.start_difficulty()
}

pub fn reward() -> Amount {
    Amount::from_coins(64).unwrap()
}
