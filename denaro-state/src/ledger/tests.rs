use std::sync::Arc;

use denaro_chain::address::Address;
use denaro_chain::amount::Amount;
use denaro_chain::block::{Block, Header, Height};
use denaro_chain::keys::SecretKey;
use denaro_chain::parameters::{Network, GENESIS_PREVIOUS_BLOCK_HASH};
use denaro_chain::transaction::{Input, OutPoint, Output, Transaction, CURRENT_VERSION};
use denaro_chain::work::difficulty::Difficulty;

use super::*;
use crate::mempool::MempoolEntry;

fn fresh_state() -> LedgerState {
    denaro_test::init();
    LedgerState::new(&Config::ephemeral(), Network::Regtest).expect("ephemeral state opens")
}

fn test_address() -> Address {
    Address::from(&SecretKey::generate().public_key())
}

fn block_with(
    previous: block::Hash,
    transactions: Vec<Arc<Transaction>>,
    timestamp: u64,
) -> Arc<Block> {
    let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
    let header = Header::new(
        previous,
        merkle_root,
        test_address(),
        timestamp,
        Difficulty::from_tenths(10),
        0,
    );
    Arc::new(Block {
        header,
        transactions,
    })
}

fn reward() -> Amount {
    Amount::from_coins(64).unwrap()
}

/// A committed genesis block paying its reward to `address`.
fn committed_genesis(state: &mut LedgerState, address: Address) -> (Arc<Block>, OutPoint) {
    let coinbase = Arc::new(Transaction::coinbase(address, reward()));
    let outpoint = OutPoint {
        hash: coinbase.hash(),
        index: 0,
    };
    let genesis = block_with(GENESIS_PREVIOUS_BLOCK_HASH, vec![coinbase], 1_000);
    state
        .apply_block(&genesis, Height(1), reward(), 1_000)
        .expect("genesis applies");
    (genesis, outpoint)
}

#[test]
fn apply_block_then_query_by_hash_and_height() {
    let mut state = fresh_state();
    let (genesis, _) = committed_genesis(&mut state, test_address());

    assert_eq!(state.tip().unwrap(), Some((Height(1), genesis.hash())));
    assert_eq!(state.supply().unwrap(), reward());

    let by_height = state.block(Height(1)).unwrap().unwrap();
    let by_hash = state.block(genesis.hash()).unwrap().unwrap();
    assert_eq!(by_height, by_hash);
    assert_eq!(by_height.hash(), genesis.hash());
    assert_eq!(by_height.transactions, genesis.transactions);
}

#[test]
fn duplicate_block_rejected() {
    let mut state = fresh_state();
    let (genesis, _) = committed_genesis(&mut state, test_address());

    let result = state.apply_block(&genesis, Height(2), reward(), 1_001);
    assert!(matches!(result, Err(StateError::DuplicateBlock(_))));
}

#[test]
fn spending_moves_the_utxo() {
    let mut state = fresh_state();
    let miner = test_address();
    let recipient = test_address();
    let (genesis, coinbase_outpoint) = committed_genesis(&mut state, miner);

    let fee = Amount::from_units(5_000).unwrap();
    let spend = Arc::new(Transaction::new(
        CURRENT_VERSION,
        vec![Input::unsigned(coinbase_outpoint)],
        vec![Output {
            address: recipient,
            amount: reward().checked_sub(fee).unwrap(),
        }],
        None,
        fee,
    ));
    let spend_outpoint = OutPoint {
        hash: spend.hash(),
        index: 0,
    };
    let coinbase2 = Arc::new(Transaction::coinbase(
        miner,
        reward().checked_add(fee).unwrap(),
    ));
    let block2 = block_with(genesis.hash(), vec![coinbase2, spend], 1_180);
    state
        .apply_block(&block2, Height(2), reward(), 1_180)
        .expect("block 2 applies");

    // The coinbase output is gone; the new output exists and pays recipient.
    assert!(!state.is_unspent(&coinbase_outpoint));
    let output = state.unspent_output(&spend_outpoint).unwrap().unwrap();
    assert_eq!(output.address, recipient);

    let for_recipient = state.unspent_for_address(&recipient).unwrap();
    assert_eq!(for_recipient.len(), 1);
    assert_eq!(for_recipient[0].0, spend_outpoint);
}

#[test]
fn double_spend_rejected_by_apply() {
    let mut state = fresh_state();
    let miner = test_address();
    let (genesis, coinbase_outpoint) = committed_genesis(&mut state, miner);

    let spend = |fees: i64| {
        Arc::new(Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(coinbase_outpoint)],
            vec![Output {
                address: test_address(),
                amount: reward().checked_sub(Amount::from_units(fees).unwrap()).unwrap(),
            }],
            None,
            Amount::from_units(fees).unwrap(),
        ))
    };

    let block2 = block_with(
        genesis.hash(),
        vec![Arc::new(Transaction::coinbase(miner, reward().checked_add(Amount::from_units(1).unwrap()).unwrap())), spend(1)],
        1_180,
    );
    state
        .apply_block(&block2, Height(2), reward(), 1_180)
        .unwrap();

    // A later block consuming the same outpoint must abort whole.
    let block3 = block_with(block2.hash(), vec![spend(2)], 1_360);
    let result = state.apply_block(&block3, Height(3), reward(), 1_360);
    assert!(matches!(result, Err(StateError::MissingUtxo(_))));

    // The failed unit of work left no trace.
    assert_eq!(state.tip().unwrap(), Some((Height(2), block2.hash())));
    assert!(state.block(Height(3)).unwrap().is_none());
}

#[test]
fn undo_restores_the_previous_state_exactly() {
    let mut state = fresh_state();
    let miner = test_address();
    let (genesis, coinbase_outpoint) = committed_genesis(&mut state, miner);

    let supply_before = state.supply().unwrap();
    let output_before = state.unspent_output(&coinbase_outpoint).unwrap().unwrap();

    let fee = Amount::from_units(1_000).unwrap();
    let spend = Arc::new(Transaction::new(
        CURRENT_VERSION,
        vec![Input::unsigned(coinbase_outpoint)],
        vec![Output {
            address: test_address(),
            amount: reward().checked_sub(fee).unwrap(),
        }],
        None,
        fee,
    ));
    let coinbase2 = Arc::new(Transaction::coinbase(
        miner,
        reward().checked_add(fee).unwrap(),
    ));
    let block2 = block_with(genesis.hash(), vec![coinbase2, spend.clone()], 1_180);
    state
        .apply_block(&block2, Height(2), reward(), 1_180)
        .unwrap();

    let undone = state.undo_tip_block().expect("tip undoes");
    assert_eq!(undone.hash(), block2.hash());

    // Tip, supply, and the consumed output are exactly as before.
    assert_eq!(state.tip().unwrap(), Some((Height(1), genesis.hash())));
    assert_eq!(state.supply().unwrap(), supply_before);
    assert_eq!(
        state.unspent_output(&coinbase_outpoint).unwrap().unwrap(),
        output_before
    );
    // The undone block's rows are gone, including its outputs.
    assert!(state.transaction(&spend.hash()).unwrap().is_none());
    assert!(!state.is_unspent(&OutPoint {
        hash: spend.hash(),
        index: 0,
    }));
}

#[test]
fn mempool_reservation_conflicts_are_rejected() {
    let mut state = fresh_state();
    let miner = test_address();
    let (_, coinbase_outpoint) = committed_genesis(&mut state, miner);

    let pending = |fees: i64, time: u64| {
        let tx = Arc::new(Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(coinbase_outpoint)],
            vec![Output {
                address: test_address(),
                amount: Amount::from_units(1).unwrap(),
            }],
            None,
            Amount::from_units(fees).unwrap(),
        ));
        MempoolEntry::new(tx, time, time, vec![miner])
    };

    state.admit_pending(pending(10, 1)).expect("first admission");
    let conflict = state.admit_pending(pending(20, 2));
    assert!(matches!(conflict, Err(StateError::ReservationConflict(_))));
    assert_eq!(state.mempool().len(), 1);
}

#[test]
fn applying_a_block_evicts_included_and_conflicting_pending() {
    let mut state = fresh_state();
    let miner = test_address();
    let (genesis, coinbase_outpoint) = committed_genesis(&mut state, miner);

    // A pending transaction reserves the coinbase output.
    let fee = Amount::from_units(100).unwrap();
    let pending_tx = Arc::new(Transaction::new(
        CURRENT_VERSION,
        vec![Input::unsigned(coinbase_outpoint)],
        vec![Output {
            address: test_address(),
            amount: reward().checked_sub(fee).unwrap(),
        }],
        None,
        fee,
    ));
    state
        .admit_pending(MempoolEntry::new(pending_tx.clone(), 1, 1, vec![miner]))
        .unwrap();
    assert_eq!(state.mempool().len(), 1);

    // A block spends that same output with a *different* transaction.
    let other_fee = Amount::from_units(999).unwrap();
    let competing = Arc::new(Transaction::new(
        CURRENT_VERSION,
        vec![Input::unsigned(coinbase_outpoint)],
        vec![Output {
            address: test_address(),
            amount: reward().checked_sub(other_fee).unwrap(),
        }],
        None,
        other_fee,
    ));
    let coinbase2 = Arc::new(Transaction::coinbase(
        miner,
        reward().checked_add(other_fee).unwrap(),
    ));
    let block2 = block_with(genesis.hash(), vec![coinbase2, competing], 1_180);
    state
        .apply_block(&block2, Height(2), reward(), 1_180)
        .unwrap();

    // The conflicting pending transaction is gone and its reservation freed.
    assert_eq!(state.mempool().len(), 0);
    assert!(state
        .mempool()
        .reservation(&coinbase_outpoint)
        .is_none());
}

#[test]
fn pending_rows_survive_reopen() {
    denaro_test::init();

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        cache_dir: dir.path().to_path_buf(),
        database_name: "test".to_string(),
        ephemeral: false,
    };

    let miner = test_address();
    let outpoint;
    {
        let mut state = LedgerState::new(&config, Network::Regtest).unwrap();
        let (_, coinbase_outpoint) = committed_genesis(&mut state, miner);
        outpoint = coinbase_outpoint;

        let tx = Arc::new(Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(coinbase_outpoint)],
            vec![Output {
                address: test_address(),
                amount: Amount::from_units(1).unwrap(),
            }],
            None,
            Amount::from_units(10).unwrap(),
        ));
        state
            .admit_pending(MempoolEntry::new(tx, 7, 7, vec![miner]))
            .unwrap();
        state.flush().unwrap();
    }

    let state = LedgerState::new(&config, Network::Regtest).unwrap();
    assert_eq!(state.mempool().len(), 1);
    assert!(state.mempool().reservation(&outpoint).is_some());
}

#[test]
fn locator_intersection_finds_highest_match() {
    let mut state = fresh_state();
    let miner = test_address();
    let (genesis, _) = committed_genesis(&mut state, miner);

    let mut previous = genesis.hash();
    for height in 2..=5u32 {
        let coinbase = Arc::new(Transaction::coinbase(test_address(), reward()));
        let block = block_with(previous, vec![coinbase], 1_000 + height as u64 * 180);
        state
            .apply_block(&block, Height(height), reward(), 2_000)
            .unwrap();
        previous = block.hash();
    }

    let locator = state.block_locator().unwrap();
    assert_eq!(locator[0].0, Height(5));

    // A locator from a diverged peer matches only at the shared prefix.
    let mut diverged = locator.clone();
    diverged[0].1 = block::Hash([0xaa; 32]);
    let intersection = state.locator_intersection(&diverged).unwrap();
    assert_eq!(intersection, Some(Height(4)));
}
