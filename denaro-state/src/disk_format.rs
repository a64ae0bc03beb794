//! Row encodings for the sled-backed ledger.
//!
//! The schema contract has five relations (blocks, transactions,
//! unspent_outputs, pending_transactions, pending_spent_outputs) plus the
//! peers table. Here each relation is a key prefix inside one of two trees:
//! consensus state in `chain`, the pending pool in `mempool`. Key layouts are
//! chosen so that the two required secondary indexes fall out of prefix
//! scans: unspent outputs are keyed by `tx_hash ‖ index`, and block rows
//! carry their transaction hash list.

use std::convert::TryInto;
use std::sync::Arc;

use denaro_chain::address::Address;
use denaro_chain::block::{self, Block, Header, Height};
use denaro_chain::transaction::{self, OutPoint, Transaction};
use denaro_chain::varint::VarInt;
use denaro_chain::{DenaroDeserialize, DenaroSerialize};

use crate::StateError;

// Key prefixes inside the `chain` tree.
pub(crate) const HASH_BY_HEIGHT: u8 = b'h';
pub(crate) const HEIGHT_BY_HASH: u8 = b'g';
pub(crate) const BLOCK_BY_HEIGHT: u8 = b'b';
pub(crate) const TX_BY_HASH: u8 = b't';
pub(crate) const UTXO_BY_OUTPOINT: u8 = b'u';
pub(crate) const UNDO_BY_BLOCK: u8 = b'j';
pub(crate) const META: u8 = b'm';

// Key prefixes inside the `mempool` tree.
pub(crate) const PENDING_BY_HASH: u8 = b'p';
pub(crate) const RESERVED_BY_OUTPOINT: u8 = b'r';

pub(crate) fn height_key(prefix: u8, height: Height) -> [u8; 5] {
    let mut key = [prefix; 5];
    // Big-endian so lexicographic key order is height order.
    key[1..].copy_from_slice(&height.0.to_be_bytes());
    key
}

pub(crate) fn hash_key(prefix: u8, hash: &[u8; 32]) -> [u8; 33] {
    let mut key = [prefix; 33];
    key[1..].copy_from_slice(hash);
    key
}

pub(crate) fn outpoint_key(prefix: u8, outpoint: &OutPoint) -> [u8; 34] {
    let mut key = [prefix; 34];
    key[1..33].copy_from_slice(&outpoint.hash.0);
    key[33] = outpoint.index;
    key
}

pub(crate) fn supply_key() -> [u8; 7] {
    let mut key = [META; 7];
    key[1..].copy_from_slice(b"supply");
    key
}

pub(crate) fn decode_height(bytes: &[u8]) -> Result<Height, StateError> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StateError::Corrupt("height row has wrong length"))?;
    Ok(Height(u32::from_be_bytes(bytes)))
}

pub(crate) fn decode_block_hash(bytes: &[u8]) -> Result<block::Hash, StateError> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StateError::Corrupt("hash row has wrong length"))?;
    Ok(block::Hash(bytes))
}

pub(crate) fn decode_tx_hash(bytes: &[u8]) -> Result<transaction::Hash, StateError> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StateError::Corrupt("hash row has wrong length"))?;
    Ok(transaction::Hash(bytes))
}

/// The `blocks` relation row: the header, the minted reward, and the ordered
/// transaction hash list (doubling as the `transactions(block_hash)` index).
pub(crate) struct BlockRow {
    pub header: Header,
    pub reward: u64,
    pub tx_hashes: Vec<transaction::Hash>,
}

impl BlockRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Header::len() + 8 + 1 + 32 * self.tx_hashes.len());
        self.header
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        self.reward
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        VarInt::from(self.tx_hashes.len())
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        for hash in &self.tx_hashes {
            hash.denaro_serialize(&mut bytes)
                .expect("writing to a vec never fails");
        }
        bytes
    }

    pub fn decode(mut bytes: &[u8]) -> Result<BlockRow, StateError> {
        let header = Header::denaro_deserialize(&mut bytes)?;
        let reward = u64::denaro_deserialize(&mut bytes)?;
        let count = VarInt::denaro_deserialize(&mut bytes)?.value() as usize;
        let mut tx_hashes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            tx_hashes.push(transaction::Hash::denaro_deserialize(&mut bytes)?);
        }
        Ok(BlockRow {
            header,
            reward,
            tx_hashes,
        })
    }
}

/// The `transactions` relation row. Input addresses are stored explicitly
/// because the outputs they resolved to are deleted when spent.
pub(crate) struct TxRow {
    pub block_hash: block::Hash,
    pub time_received: u64,
    pub input_addresses: Vec<Address>,
    pub transaction: Arc<Transaction>,
}

impl TxRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.block_hash
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        self.time_received
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        VarInt::from(self.input_addresses.len())
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        for address in &self.input_addresses {
            address
                .denaro_serialize(&mut bytes)
                .expect("writing to a vec never fails");
        }
        self.transaction
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        bytes
    }

    pub fn decode(mut bytes: &[u8]) -> Result<TxRow, StateError> {
        let block_hash = block::Hash::denaro_deserialize(&mut bytes)?;
        let time_received = u64::denaro_deserialize(&mut bytes)?;
        let count = VarInt::denaro_deserialize(&mut bytes)?.value() as usize;
        let mut input_addresses = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            input_addresses.push(Address::denaro_deserialize(&mut bytes)?);
        }
        let transaction = Arc::new(Transaction::denaro_deserialize(&mut bytes)?);
        Ok(TxRow {
            block_hash,
            time_received,
            input_addresses,
            transaction,
        })
    }
}

/// The `pending_transactions` relation row.
pub(crate) struct PendingRow {
    pub time_received: u64,
    pub propagation_time: u64,
    pub input_addresses: Vec<Address>,
    pub transaction: Arc<Transaction>,
}

impl PendingRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.time_received
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        self.propagation_time
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        VarInt::from(self.input_addresses.len())
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        for address in &self.input_addresses {
            address
                .denaro_serialize(&mut bytes)
                .expect("writing to a vec never fails");
        }
        self.transaction
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        bytes
    }

    pub fn decode(mut bytes: &[u8]) -> Result<PendingRow, StateError> {
        let time_received = u64::denaro_deserialize(&mut bytes)?;
        let propagation_time = u64::denaro_deserialize(&mut bytes)?;
        let count = VarInt::denaro_deserialize(&mut bytes)?.value() as usize;
        let mut input_addresses = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            input_addresses.push(Address::denaro_deserialize(&mut bytes)?);
        }
        let transaction = Arc::new(Transaction::denaro_deserialize(&mut bytes)?);
        Ok(PendingRow {
            time_received,
            propagation_time,
            input_addresses,
            transaction,
        })
    }
}

/// A reverse-journal entry recorded at apply time: one consumed output and
/// the address it paid, enough to re-materialize it on reorg.
pub(crate) struct UndoEntry {
    pub outpoint: OutPoint,
    pub address: Address,
}

pub(crate) fn encode_undo(entries: &[UndoEntry]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + entries.len() * 66);
    VarInt::from(entries.len())
        .denaro_serialize(&mut bytes)
        .expect("writing to a vec never fails");
    for entry in entries {
        entry
            .outpoint
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
        entry
            .address
            .denaro_serialize(&mut bytes)
            .expect("writing to a vec never fails");
    }
    bytes
}

pub(crate) fn decode_undo(mut bytes: &[u8]) -> Result<Vec<UndoEntry>, StateError> {
    let count = VarInt::denaro_deserialize(&mut bytes)?.value() as usize;
    let mut entries = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        entries.push(UndoEntry {
            outpoint: OutPoint::denaro_deserialize(&mut bytes)?,
            address: Address::denaro_deserialize(&mut bytes)?,
        });
    }
    Ok(entries)
}

pub(crate) fn reconstruct_block(row: &BlockRow, transactions: Vec<Arc<Transaction>>) -> Block {
    Block {
        header: row.header,
        transactions,
    }
}
