//! The durable ledger state, built on sled.
//!
//! One `chain` tree holds the committed relations (blocks, transactions,
//! unspent outputs, the per-block undo journal, and the supply counter); one
//! `mempool` tree holds pending transactions and their output reservations.
//! Every multi-row mutation runs as a sled transaction across both trees, so
//! readers never observe a half-applied block and the pending pool stays
//! consistent with the UTXO set at every committed unit of work.

use std::convert::TryInto;
use std::sync::Arc;

use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use tracing::{debug, trace};

use denaro_chain::address::Address;
use denaro_chain::amount::Amount;
use denaro_chain::block::{self, Block, Height};
use denaro_chain::parameters::Network;
use denaro_chain::transaction::{self, OutPoint, Output, Transaction};

use crate::disk_format::*;
use crate::mempool::{Mempool, MempoolEntry, MAX_MEMPOOL_SIZE};
use crate::util::block_locator_heights;
use crate::{Config, HashOrHeight, StateError};

/// The authoritative chain and mempool state for one node.
pub struct LedgerState {
    // The handle keeps the database open for the trees below.
    _db: sled::Db,
    chain: sled::Tree,
    pool: sled::Tree,
    peers: sled::Tree,
    mempool: Mempool,
    network: Network,
}

impl std::fmt::Debug for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerState")
            .field("network", &self.network)
            .field("mempool", &self.mempool.len())
            .finish()
    }
}

impl LedgerState {
    pub fn new(config: &Config, network: Network) -> Result<LedgerState, StateError> {
        let db = config.sled_config(network).open()?;
        let chain = db.open_tree(b"chain")?;
        let pool = db.open_tree(b"mempool")?;
        let peers = db.open_tree(b"peers")?;

        let mut state = LedgerState {
            _db: db,
            chain,
            pool,
            peers,
            mempool: Mempool::default(),
            network,
        };
        state.rebuild_mempool_index()?;
        Ok(state)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The in-memory pending pool index, rebuilt from storage at startup.
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Re-derive the in-memory mempool index from the durable rows.
    fn rebuild_mempool_index(&mut self) -> Result<(), StateError> {
        let mut mempool = Mempool::default();
        for row in self.pool.scan_prefix([PENDING_BY_HASH]) {
            let (_, value) = row?;
            let row = PendingRow::decode(&value)?;
            mempool.insert(MempoolEntry::new(
                row.transaction,
                row.time_received,
                row.propagation_time,
                row.input_addresses,
            ));
        }
        debug!(pending = mempool.len(), "rebuilt mempool index");
        self.mempool = mempool;
        Ok(())
    }

    // ===== Chain queries =====

    /// Returns the height and hash of the chain tip, if any block has been
    /// committed.
    pub fn tip(&self) -> Result<Option<(Height, block::Hash)>, StateError> {
        match self.chain.scan_prefix([HASH_BY_HEIGHT]).next_back() {
            Some(row) => {
                let (key, value) = row?;
                Ok(Some((decode_height(&key[1..])?, decode_block_hash(&value)?)))
            }
            None => Ok(None),
        }
    }

    pub fn height_by_hash(&self, hash: &block::Hash) -> Result<Option<Height>, StateError> {
        match self.chain.get(hash_key(HEIGHT_BY_HASH, &hash.0))? {
            Some(value) => Ok(Some(decode_height(&value)?)),
            None => Ok(None),
        }
    }

    pub fn hash_by_height(&self, height: Height) -> Result<Option<block::Hash>, StateError> {
        match self.chain.get(height_key(HASH_BY_HEIGHT, height))? {
            Some(value) => Ok(Some(decode_block_hash(&value)?)),
            None => Ok(None),
        }
    }

    pub fn contains_block(&self, hash: &block::Hash) -> Result<bool, StateError> {
        Ok(self.height_by_hash(hash)?.is_some())
    }

    /// Fetch a full block by hash or height.
    pub fn block(
        &self,
        hash_or_height: impl Into<HashOrHeight>,
    ) -> Result<Option<Arc<Block>>, StateError> {
        let height = match hash_or_height.into() {
            HashOrHeight::Height(height) => height,
            HashOrHeight::Hash(hash) => match self.height_by_hash(&hash)? {
                Some(height) => height,
                None => return Ok(None),
            },
        };
        let row = match self.chain.get(height_key(BLOCK_BY_HEIGHT, height))? {
            Some(value) => BlockRow::decode(&value)?,
            None => return Ok(None),
        };

        let mut transactions = Vec::with_capacity(row.tx_hashes.len());
        for tx_hash in &row.tx_hashes {
            let tx_row = self
                .chain
                .get(hash_key(TX_BY_HASH, &tx_hash.0))?
                .ok_or(StateError::Corrupt("block row references missing transaction"))?;
            transactions.push(TxRow::decode(&tx_row)?.transaction);
        }
        Ok(Some(Arc::new(reconstruct_block(&row, transactions))))
    }

    /// Fetch the contiguous range of blocks `lo..=hi`, stopping early at the
    /// tip or after `max_blocks`.
    pub fn block_range(
        &self,
        lo: Height,
        hi: Height,
        max_blocks: usize,
    ) -> Result<Vec<Arc<Block>>, StateError> {
        let mut blocks = Vec::new();
        let mut height = lo;
        while height <= hi && blocks.len() < max_blocks {
            match self.block(height)? {
                Some(block) => blocks.push(block),
                None => break,
            }
            height = height.succ();
        }
        Ok(blocks)
    }

    /// Look up a committed transaction and the block that contains it.
    pub fn transaction(
        &self,
        hash: &transaction::Hash,
    ) -> Result<Option<(block::Hash, Arc<Transaction>)>, StateError> {
        match self.chain.get(hash_key(TX_BY_HASH, &hash.0))? {
            Some(value) => {
                let row = TxRow::decode(&value)?;
                Ok(Some((row.block_hash, row.transaction)))
            }
            None => Ok(None),
        }
    }

    /// Resolve an outpoint against the UTXO set, returning the full output.
    ///
    /// The unspent row stores only the address; the amount is looked up from
    /// the producing transaction, which must exist while the row does.
    pub fn unspent_output(&self, outpoint: &OutPoint) -> Result<Option<Output>, StateError> {
        if self
            .chain
            .get(outpoint_key(UTXO_BY_OUTPOINT, outpoint))?
            .is_none()
        {
            return Ok(None);
        }
        let tx_row = self
            .chain
            .get(hash_key(TX_BY_HASH, &outpoint.hash.0))?
            .ok_or(StateError::Corrupt("unspent row references missing transaction"))?;
        let transaction = TxRow::decode(&tx_row)?.transaction;
        let output = transaction
            .outputs
            .get(outpoint.index as usize)
            .ok_or(StateError::Corrupt("unspent row references missing output"))?;
        Ok(Some(*output))
    }

    /// `true` when the outpoint is currently spendable. Errors degrade to
    /// `false`; callers needing the distinction use [`unspent_output`].
    pub fn is_unspent(&self, outpoint: &OutPoint) -> bool {
        matches!(
            self.chain.get(outpoint_key(UTXO_BY_OUTPOINT, outpoint)),
            Ok(Some(_))
        )
    }

    /// Every spendable output paying `address`.
    pub fn unspent_for_address(
        &self,
        address: &Address,
    ) -> Result<Vec<(OutPoint, Amount)>, StateError> {
        let wanted = address.to_sec1_bytes();
        let mut found = Vec::new();
        for row in self.chain.scan_prefix([UTXO_BY_OUTPOINT]) {
            let (key, value) = row?;
            if value.as_ref() != wanted {
                continue;
            }
            let outpoint = OutPoint {
                hash: decode_tx_hash(&key[1..33])?,
                index: key[33],
            };
            if let Some(output) = self.unspent_output(&outpoint)? {
                found.push((outpoint, output.amount));
            }
        }
        Ok(found)
    }

    /// Total coins minted by the committed chain, in smallest units.
    pub fn supply(&self) -> Result<Amount, StateError> {
        let units = match self.chain.get(supply_key())? {
            Some(value) => u64::from_le_bytes(
                value
                    .as_ref()
                    .try_into()
                    .map_err(|_| StateError::Corrupt("supply row has wrong length"))?,
            ),
            None => 0,
        };
        Amount::from_units(units as i64).map_err(|_| StateError::Corrupt("supply out of range"))
    }

    /// A sparse locator over the committed chain: the tip, then hashes at
    /// exponentially growing distances behind it, ending at genesis.
    pub fn block_locator(&self) -> Result<Vec<(Height, block::Hash)>, StateError> {
        let (tip_height, _) = match self.tip()? {
            Some(tip) => tip,
            None => return Ok(Vec::new()),
        };

        let mut locator = Vec::new();
        for height in block_locator_heights(tip_height) {
            if let Some(hash) = self.hash_by_height(height)? {
                locator.push((height, hash));
            }
        }
        Ok(locator)
    }

    /// The highest locator entry that matches this node's chain. Serves the
    /// reconciliation step of a peer's pull sync.
    pub fn locator_intersection(
        &self,
        locator: &[(Height, block::Hash)],
    ) -> Result<Option<Height>, StateError> {
        let mut entries: Vec<_> = locator.to_vec();
        entries.sort_by_key(|(height, _)| std::cmp::Reverse(*height));
        for (height, hash) in entries {
            if self.hash_by_height(height)? == Some(hash) {
                return Ok(Some(height));
            }
        }
        Ok(None)
    }

    // ===== Chain mutations =====

    /// Commit `block` at `height` as the new tip, as one unit of work.
    ///
    /// Spends every input (recording the reverse journal), creates every
    /// output, and drops pending transactions that were included or now
    /// conflict. The caller holds the chain lock and has already performed
    /// contextual validation; the UTXO resolution done here is the
    /// authoritative double-spend check.
    pub fn apply_block(
        &mut self,
        block: &Arc<Block>,
        height: Height,
        reward: Amount,
        time_received: u64,
    ) -> Result<(), StateError> {
        let hash = block.hash();

        let removed_pending = (&self.chain, &self.pool)
            .transaction(|(chain, pool)| {
                let mut undo = Vec::new();
                let mut removed_pending = Vec::new();
                let mut tx_hashes = Vec::with_capacity(block.transactions.len());

                if chain.get(hash_key(HEIGHT_BY_HASH, &hash.0))?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        StateError::DuplicateBlock(hash),
                    ));
                }

                for tx in &block.transactions {
                    let tx_hash = tx.hash();
                    tx_hashes.push(tx_hash);

                    let mut input_addresses = Vec::with_capacity(tx.inputs.len());
                    for input in &tx.inputs {
                        // Deleting the row is the spend; a missing row is a
                        // double spend or unknown reference.
                        let stored = chain
                            .remove(&outpoint_key(UTXO_BY_OUTPOINT, &input.outpoint)[..])?
                            .ok_or(ConflictableTransactionError::Abort(
                                StateError::MissingUtxo(input.outpoint),
                            ))?;
                        let stored: [u8; 33] = stored.as_ref().try_into().map_err(|_| {
                            ConflictableTransactionError::Abort(StateError::Corrupt(
                                "unspent row has wrong length",
                            ))
                        })?;
                        let address = Address::from_sec1_bytes(&stored).map_err(|_| {
                            ConflictableTransactionError::Abort(StateError::Corrupt(
                                "unspent row holds an invalid address",
                            ))
                        })?;
                        input_addresses.push(address);
                        undo.push(UndoEntry {
                            outpoint: input.outpoint,
                            address,
                        });

                        // Evict any pending transaction reserving this output.
                        if let Some(reserved) =
                            pool.get(&outpoint_key(RESERVED_BY_OUTPOINT, &input.outpoint)[..])?
                        {
                            let reserved = decode_tx_hash(&reserved)
                                .map_err(ConflictableTransactionError::Abort)?;
                            remove_pending_rows(pool, &reserved)?;
                            removed_pending.push(reserved);
                        }
                    }

                    let row = TxRow {
                        block_hash: hash,
                        time_received,
                        input_addresses,
                        transaction: tx.clone(),
                    };
                    chain.insert(&hash_key(TX_BY_HASH, &tx_hash.0)[..], row.encode())?;

                    for (index, output) in tx.outputs.iter().enumerate() {
                        let outpoint = OutPoint {
                            hash: tx_hash,
                            index: index as u8,
                        };
                        chain.insert(
                            &outpoint_key(UTXO_BY_OUTPOINT, &outpoint)[..],
                            &output.address.to_sec1_bytes()[..],
                        )?;
                    }

                    // Included transactions leave the pending pool.
                    if pool.get(&hash_key(PENDING_BY_HASH, &tx_hash.0)[..])?.is_some() {
                        remove_pending_rows(pool, &tx_hash)?;
                        removed_pending.push(tx_hash);
                    }
                }

                chain.insert(&height_key(HASH_BY_HEIGHT, height)[..], &hash.0[..])?;
                chain.insert(&hash_key(HEIGHT_BY_HASH, &hash.0)[..], &height.0.to_be_bytes()[..])?;
                chain.insert(
                    &height_key(BLOCK_BY_HEIGHT, height)[..],
                    BlockRow {
                        header: block.header,
                        reward: reward.units() as u64,
                        tx_hashes,
                    }
                    .encode(),
                )?;
                chain.insert(&hash_key(UNDO_BY_BLOCK, &hash.0)[..], encode_undo(&undo))?;

                let supply = match chain.get(&supply_key()[..])? {
                    Some(value) => u64::from_le_bytes(value.as_ref().try_into().map_err(|_| {
                        ConflictableTransactionError::Abort(StateError::Corrupt(
                            "supply row has wrong length",
                        ))
                    })?),
                    None => 0,
                };
                chain.insert(
                    &supply_key()[..],
                    &(supply + reward.units() as u64).to_le_bytes()[..],
                )?;

                Ok(removed_pending)
            })
            .map_err(unwrap_transaction_error)?;

        for pending in &removed_pending {
            self.mempool.remove(pending);
        }

        trace!(%hash, height = height.0, "committed block");
        metrics::counter!("state.committed.block.count", 1);
        metrics::gauge!("state.committed.block.height", height.0 as f64);
        metrics::gauge!("state.mempool.size", self.mempool.len() as f64);
        Ok(())
    }

    /// Undo the tip block as one unit of work, returning it for possible
    /// re-admission of its transactions.
    ///
    /// Deleting the block row cascades to its transactions and the outputs
    /// they created; the reverse journal re-materializes the outputs the
    /// block had consumed.
    pub fn undo_tip_block(&mut self) -> Result<Arc<Block>, StateError> {
        let (height, hash) = self.tip()?.ok_or(StateError::EmptyChain)?;
        let block = self
            .block(hash)?
            .ok_or(StateError::Corrupt("tip block row is missing"))?;

        (&self.chain, &self.pool)
            .transaction(|(chain, _pool)| {
                chain.remove(&height_key(HASH_BY_HEIGHT, height)[..])?;
                chain.remove(&hash_key(HEIGHT_BY_HASH, &hash.0)[..])?;

                let row = chain
                    .remove(&height_key(BLOCK_BY_HEIGHT, height)[..])?
                    .ok_or(ConflictableTransactionError::Abort(StateError::Corrupt(
                        "tip block row is missing",
                    )))?;
                let row = BlockRow::decode(&row).map_err(ConflictableTransactionError::Abort)?;

                for tx_hash in &row.tx_hashes {
                    let tx_row = chain
                        .remove(&hash_key(TX_BY_HASH, &tx_hash.0)[..])?
                        .ok_or(ConflictableTransactionError::Abort(StateError::Corrupt(
                            "block row references missing transaction",
                        )))?;
                    let tx_row =
                        TxRow::decode(&tx_row).map_err(ConflictableTransactionError::Abort)?;
                    for index in 0..tx_row.transaction.outputs.len() {
                        let outpoint = OutPoint {
                            hash: *tx_hash,
                            index: index as u8,
                        };
                        chain.remove(&outpoint_key(UTXO_BY_OUTPOINT, &outpoint)[..])?;
                    }
                }

                let undo = chain
                    .remove(&hash_key(UNDO_BY_BLOCK, &hash.0)[..])?
                    .ok_or(ConflictableTransactionError::Abort(StateError::Corrupt(
                        "undo journal row is missing",
                    )))?;
                let undo = decode_undo(&undo).map_err(ConflictableTransactionError::Abort)?;
                for entry in &undo {
                    chain.insert(
                        &outpoint_key(UTXO_BY_OUTPOINT, &entry.outpoint)[..],
                        &entry.address.to_sec1_bytes()[..],
                    )?;
                }

                let supply = match chain.get(&supply_key()[..])? {
                    Some(value) => u64::from_le_bytes(value.as_ref().try_into().map_err(|_| {
                        ConflictableTransactionError::Abort(StateError::Corrupt(
                            "supply row has wrong length",
                        ))
                    })?),
                    None => 0,
                };
                chain.insert(
                    &supply_key()[..],
                    &supply.saturating_sub(row.reward).to_le_bytes()[..],
                )?;

                Ok(())
            })
            .map_err(unwrap_transaction_error)?;

        debug!(%hash, height = height.0, "undid tip block");
        metrics::counter!("state.undone.block.count", 1);
        Ok(block)
    }

    // ===== Mempool mutations =====

    /// Admit a validated pending transaction, evicting the cheapest older
    /// entry if the pool is full and the newcomer outbids it.
    ///
    /// Returns the evicted transaction hash, if any.
    pub fn admit_pending(
        &mut self,
        entry: MempoolEntry,
    ) -> Result<Option<transaction::Hash>, StateError> {
        let hash = entry.transaction.hash();

        let evicted = if self.mempool.len() >= MAX_MEMPOOL_SIZE {
            match self.mempool.eviction_candidate(entry.time_received) {
                Some((candidate, rate)) if rate < entry.fee_rate => Some(candidate),
                _ => return Err(StateError::MempoolFull),
            }
        } else {
            None
        };

        let row = PendingRow {
            time_received: entry.time_received,
            propagation_time: entry.propagation_time,
            input_addresses: entry.input_addresses.clone(),
            transaction: entry.transaction.clone(),
        };

        self.pool
            .transaction(|pool| {
                for input in &entry.transaction.inputs {
                    if pool
                        .get(&outpoint_key(RESERVED_BY_OUTPOINT, &input.outpoint)[..])?
                        .is_some()
                    {
                        return Err(ConflictableTransactionError::Abort(
                            StateError::ReservationConflict(input.outpoint),
                        ));
                    }
                }
                if let Some(evicted) = &evicted {
                    remove_pending_rows(pool, evicted)?;
                }
                pool.insert(&hash_key(PENDING_BY_HASH, &hash.0)[..], row.encode())?;
                for input in &entry.transaction.inputs {
                    pool.insert(
                        &outpoint_key(RESERVED_BY_OUTPOINT, &input.outpoint)[..],
                        &hash.0[..],
                    )?;
                }
                Ok(())
            })
            .map_err(unwrap_transaction_error)?;

        if let Some(evicted) = &evicted {
            self.mempool.remove(evicted);
        }
        self.mempool.insert(entry);
        metrics::gauge!("state.mempool.size", self.mempool.len() as f64);
        Ok(evicted)
    }

    /// Drop a pending transaction and release its reservations.
    pub fn remove_pending(&mut self, hash: &transaction::Hash) -> Result<(), StateError> {
        self.pool
            .transaction(|pool| {
                remove_pending_rows(pool, hash)?;
                Ok(())
            })
            .map_err(unwrap_transaction_error)?;
        self.mempool.remove(hash);
        metrics::gauge!("state.mempool.size", self.mempool.len() as f64);
        Ok(())
    }

    /// A cloneable handle to the peer relation, usable outside the chain
    /// lock (peer records have their own locking discipline).
    pub fn peer_store(&self) -> PeerStore {
        PeerStore {
            tree: self.peers.clone(),
        }
    }

    /// Flush outstanding writes; called on graceful shutdown.
    pub fn flush(&self) -> Result<(), StateError> {
        self.chain.flush()?;
        self.pool.flush()?;
        self.peers.flush()?;
        Ok(())
    }
}

/// Delete a pending row and every reservation it holds.
fn remove_pending_rows(
    pool: &sled::transaction::TransactionalTree,
    hash: &transaction::Hash,
) -> Result<(), ConflictableTransactionError<StateError>> {
    let row = match pool.remove(&hash_key(PENDING_BY_HASH, &hash.0)[..])? {
        Some(row) => row,
        None => return Ok(()),
    };
    let row = PendingRow::decode(&row).map_err(ConflictableTransactionError::Abort)?;
    for input in &row.transaction.inputs {
        let key = outpoint_key(RESERVED_BY_OUTPOINT, &input.outpoint);
        if let Some(holder) = pool.get(&key[..])? {
            if holder.as_ref() == hash.0 {
                pool.remove(&key[..])?;
            }
        }
    }
    Ok(())
}

/// The durable peer table: opaque rows keyed by node id.
///
/// The network layer owns the row format (JSON peer records); this handle
/// only moves bytes.
#[derive(Clone)]
pub struct PeerStore {
    tree: sled::Tree,
}

impl std::fmt::Debug for PeerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerStore").finish()
    }
}

impl PeerStore {
    pub fn upsert(&self, node_id: &[u8; 32], record: &[u8]) -> Result<(), StateError> {
        self.tree.insert(node_id, record)?;
        Ok(())
    }

    pub fn remove(&self, node_id: &[u8; 32]) -> Result<(), StateError> {
        self.tree.remove(node_id)?;
        Ok(())
    }

    pub fn rows(&self) -> Result<Vec<Vec<u8>>, StateError> {
        let mut rows = Vec::new();
        for row in self.tree.iter() {
            let (_, value) = row?;
            rows.push(value.to_vec());
        }
        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

fn unwrap_transaction_error(error: sled::transaction::TransactionError<StateError>) -> StateError {
    match error {
        sled::transaction::TransactionError::Abort(error) => error,
        sled::transaction::TransactionError::Storage(error) => StateError::Unavailable(error),
    }
}

#[cfg(test)]
mod tests;
