//! The in-memory index over the pending transaction pool.
//!
//! The durable rows live in the `mempool` tree; this index orders them by
//! fee rate and tracks which outputs are reserved. It is a cache: it can be
//! rebuilt from storage at startup, and every mutation here mirrors a
//! committed storage mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use denaro_chain::address::Address;
use denaro_chain::block::MAX_TX_DATA_HEX;
use denaro_chain::transaction::{self, OutPoint, Output, Transaction};

/// Hard cap on resident pending transactions.
pub const MAX_MEMPOOL_SIZE: usize = 8192;

/// Pending transactions older than this many seconds are garbage-collected.
pub const MEMPOOL_EXPIRY_SECS: u64 = 72 * 3600;

/// A pending transaction with its admission bookkeeping.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub transaction: Arc<Transaction>,
    /// Fee units per 1000 hex characters, the eviction and template ordering.
    pub fee_rate: u64,
    pub time_received: u64,
    pub propagation_time: u64,
    /// Addresses of the consumed outputs, resolved at admission.
    pub input_addresses: Vec<Address>,
}

impl MempoolEntry {
    pub fn new(
        transaction: Arc<Transaction>,
        time_received: u64,
        propagation_time: u64,
        input_addresses: Vec<Address>,
    ) -> MempoolEntry {
        let fee_rate =
            transaction.fees.units() as u64 * 1000 / transaction.hex_len().max(1) as u64;
        MempoolEntry {
            transaction,
            fee_rate,
            time_received,
            propagation_time,
            input_addresses,
        }
    }
}

#[derive(Debug, Default)]
pub struct Mempool {
    entries: HashMap<transaction::Hash, MempoolEntry>,
    reserved: HashMap<OutPoint, transaction::Hash>,
}

impl Mempool {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<&MempoolEntry> {
        self.entries.get(hash)
    }

    /// The pending transaction currently reserving `outpoint`, if any.
    pub fn reservation(&self, outpoint: &OutPoint) -> Option<transaction::Hash> {
        self.reserved.get(outpoint).copied()
    }

    /// Resolve `outpoint` against the outputs of pending transactions, so
    /// admission can accept chains of unconfirmed spends.
    pub fn pending_output(&self, outpoint: &OutPoint) -> Option<Output> {
        self.entries
            .get(&outpoint.hash)
            .and_then(|entry| entry.transaction.outputs.get(outpoint.index as usize))
            .copied()
    }

    pub fn insert(&mut self, entry: MempoolEntry) {
        let hash = entry.transaction.hash();
        for input in &entry.transaction.inputs {
            self.reserved.insert(input.outpoint, hash);
        }
        self.entries.insert(hash, entry);
    }

    pub fn remove(&mut self, hash: &transaction::Hash) -> Option<MempoolEntry> {
        let entry = self.entries.remove(hash)?;
        for input in &entry.transaction.inputs {
            if self.reserved.get(&input.outpoint) == Some(hash) {
                self.reserved.remove(&input.outpoint);
            }
        }
        Some(entry)
    }

    /// The eviction candidate on overflow: the lowest fee rate among entries
    /// received strictly before `than`, oldest first on ties.
    pub fn eviction_candidate(&self, than: u64) -> Option<(transaction::Hash, u64)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.time_received < than)
            .min_by_key(|(_, entry)| (entry.fee_rate, entry.time_received))
            .map(|(hash, entry)| (*hash, entry.fee_rate))
    }

    /// Hashes of entries received at or before `cutoff`, for expiry sweeps.
    pub fn expired(&self, cutoff: u64) -> Vec<transaction::Hash> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.time_received <= cutoff)
            .map(|(hash, _)| *hash)
            .collect()
    }

    /// All entries ordered by descending fee rate, oldest first on ties.
    pub fn ordered(&self) -> Vec<&MempoolEntry> {
        let mut ordered: Vec<_> = self.entries.values().collect();
        ordered.sort_by_key(|entry| (std::cmp::Reverse(entry.fee_rate), entry.time_received));
        ordered
    }

    /// Assemble a block template: a fee-rate-ordered selection whose combined
    /// hex size fits the per-block transaction budget, where every selected
    /// transaction's inputs come from the UTXO set (`is_unspent`) or from an
    /// earlier selected transaction.
    pub fn select_template(
        &self,
        is_unspent: impl Fn(&OutPoint) -> bool,
        max_hex: usize,
    ) -> Vec<Arc<Transaction>> {
        let max_hex = max_hex.min(MAX_TX_DATA_HEX);
        let ordered = self.ordered();

        let mut selected: Vec<Arc<Transaction>> = Vec::new();
        let mut taken = vec![false; ordered.len()];
        let mut produced: HashSet<OutPoint> = HashSet::new();
        let mut consumed: HashSet<OutPoint> = HashSet::new();
        let mut budget = max_hex;

        // Passes keep running while dependency resolution makes progress:
        // a cheap parent may only become selectable after its child's
        // better-paying siblings are in.
        loop {
            let mut progress = false;
            for (position, entry) in ordered.iter().enumerate() {
                if taken[position] || entry.transaction.hex_len() > budget {
                    continue;
                }
                let resolvable = entry.transaction.inputs.iter().all(|input| {
                    !consumed.contains(&input.outpoint)
                        && (is_unspent(&input.outpoint)
                            || produced.contains(&input.outpoint))
                });
                if !resolvable {
                    continue;
                }

                taken[position] = true;
                budget -= entry.transaction.hex_len();
                let hash = entry.transaction.hash();
                for index in 0..entry.transaction.outputs.len() {
                    produced.insert(OutPoint {
                        hash,
                        index: index as u8,
                    });
                }
                for input in &entry.transaction.inputs {
                    consumed.insert(input.outpoint);
                }
                selected.push(entry.transaction.clone());
                progress = true;
            }
            if !progress {
                break;
            }
        }

        selected
    }
}
