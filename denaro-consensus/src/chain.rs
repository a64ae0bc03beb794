//! The chain engine: tip tracking, fork choice, and reorganisation.
//!
//! All block application is serialized through one async mutex, the node's
//! *chain lock*. Mempool admission takes the same lock briefly, so the
//! pending pool is consistent with the committed UTXO set at every unit of
//! work. Side-branch blocks are stashed in memory until their branch either
//! wins on cumulative work or is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use denaro_chain::amount::Amount;
use denaro_chain::block::{self, Block, Height};
use denaro_chain::parameters::{ConsensusVersion, Network, GENESIS_PREVIOUS_BLOCK_HASH};
use denaro_chain::transaction::{OutPoint, Output, Transaction};
use denaro_chain::work::Work;
use denaro_state::{LedgerState, MempoolEntry, StateError};

use crate::block::{check, subsidy};
use crate::difficulty::{is_retarget_height, next_difficulty};
use crate::error::{BlockError, TransactionError};
use crate::parameters::{
    MAX_BLOCKS_PER_SUBMISSION, MAX_REORG_DEPTH, MAX_SIDE_BLOCKS, STORAGE_RETRIES,
    STORAGE_RETRY_BASE_MS,
};

/// What became of a submitted block.
#[derive(Copy, Clone, Debug, Eq, PartialEq, displaydoc::Display)]
pub enum BlockOutcome {
    /// applied to the canonical tip
    Applied,
    /// reorganised the chain, undoing {depth} blocks
    Reorg { depth: u32 },
    /// stored on a side branch
    SideChain,
    /// already known
    Stale,
}

/// Everything needed to mine the next block.
#[derive(Clone, Debug)]
pub struct MiningInfo {
    pub previous_hash: block::Hash,
    pub height: Height,
    pub difficulty: denaro_chain::work::difficulty::Difficulty,
    pub reward: Amount,
    pub transactions: Vec<Arc<Transaction>>,
}

struct EngineState {
    ledger: LedgerState,
    /// Side-branch blocks by their own hash, awaiting fork resolution.
    side_blocks: HashMap<block::Hash, Arc<Block>>,
}

/// The consensus engine for one node.
pub struct ChainEngine {
    network: Network,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for ChainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEngine")
            .field("network", &self.network)
            .finish()
    }
}

impl ChainEngine {
    pub fn new(ledger: LedgerState, network: Network) -> ChainEngine {
        ChainEngine {
            network,
            state: Mutex::new(EngineState {
                ledger,
                side_blocks: HashMap::new(),
            }),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    // ===== Submission =====

    /// Validate and apply one block, advancing the tip, stashing a side
    /// branch, or reorganising as the fork choice demands.
    pub async fn submit_block(&self, block: Arc<Block>) -> Result<BlockOutcome, BlockError> {
        let mut state = self.state.lock().await;
        let outcome = self.submit_locked(&mut state, block).await;
        if let Ok(outcome) = &outcome {
            metrics::counter!("consensus.block.accepted", 1);
            debug!(%outcome, "block submission settled");
        }
        outcome
    }

    /// Submit up to [`MAX_BLOCKS_PER_SUBMISSION`] contiguous blocks.
    ///
    /// Stops at the first invalid block; everything committed before it
    /// stays committed. Returns the per-block outcomes and the error that
    /// stopped the batch, if any.
    pub async fn submit_blocks(
        &self,
        blocks: Vec<Arc<Block>>,
    ) -> (Vec<BlockOutcome>, Option<BlockError>) {
        if blocks.len() > MAX_BLOCKS_PER_SUBMISSION {
            return (Vec::new(), Some(BlockError::TooManyBlocks));
        }
        for pair in blocks.windows(2) {
            if pair[1].header.previous_hash != pair[0].hash() {
                let index = blocks
                    .iter()
                    .position(|b| b.hash() == pair[1].hash())
                    .unwrap_or(0);
                return (Vec::new(), Some(BlockError::NonContiguous(index)));
            }
        }

        let mut state = self.state.lock().await;
        let mut outcomes = Vec::with_capacity(blocks.len());
        for block in blocks {
            match self.submit_locked(&mut state, block).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => return (outcomes, Some(error)),
            }
        }
        (outcomes, None)
    }

    async fn submit_locked(
        &self,
        state: &mut EngineState,
        block: Arc<Block>,
    ) -> Result<BlockOutcome, BlockError> {
        let hash = block.hash();
        if state.ledger.contains_block(&hash)? || state.side_blocks.contains_key(&hash) {
            return Ok(BlockOutcome::Stale);
        }

        let parent_hash = block.header.previous_hash;
        let tip = state.ledger.tip()?;

        // Genesis: an empty database accepts exactly one block, whose parent
        // is the all-zero sentinel.
        let (tip_height, tip_hash) = match tip {
            None => {
                if parent_hash != GENESIS_PREVIOUS_BLOCK_HASH {
                    return Err(BlockError::Orphan(parent_hash));
                }
                self.validate_and_apply(state, &block, Height::MIN).await?;
                info!(%hash, "genesis block applied");
                return Ok(BlockOutcome::Applied);
            }
            Some(tip) => tip,
        };

        // The common case: the block extends the tip.
        if parent_hash == tip_hash {
            self.validate_and_apply(state, &block, tip_height.succ())
                .await?;
            return Ok(BlockOutcome::Applied);
        }

        // Otherwise the parent must be a known non-tip block (committed or
        // stashed); anything else is an orphan.
        let (ancestor_height, branch) = match build_branch(state, &block)? {
            Some(branch) => branch,
            None => return Err(BlockError::Orphan(parent_hash)),
        };

        let depth = tip_height.0 - ancestor_height.0;
        if depth > MAX_REORG_DEPTH {
            return Err(BlockError::ReorgTooDeep(depth));
        }

        // Fork choice on cumulative work. The branch difficulties are still
        // unvalidated claims here; a lie is caught during apply and the
        // whole reorganisation rolls back.
        let branch_work: Work = branch
            .iter()
            .map(|b| Work::expected(b.header.difficulty))
            .sum();
        let mut current_work = Work::zero();
        for height in (ancestor_height.0 + 1)..=tip_height.0 {
            let committed = state
                .ledger
                .block(Height(height))?
                .ok_or(StateError::Corrupt("canonical chain has a hole"))?;
            current_work = current_work + Work::expected(committed.header.difficulty);
        }

        if branch_work <= current_work {
            stash_side_block(state, block);
            return Ok(BlockOutcome::SideChain);
        }

        self.reorganize(state, ancestor_height, depth, branch).await
    }

    /// Replace the canonical suffix above `ancestor_height` with `branch`.
    ///
    /// Undo is LIFO from the tip, apply is FIFO along the branch. Any
    /// failure rolls the whole operation back and restores the original
    /// tip before the error is reported.
    async fn reorganize(
        &self,
        state: &mut EngineState,
        ancestor_height: Height,
        depth: u32,
        branch: Vec<Arc<Block>>,
    ) -> Result<BlockOutcome, BlockError> {
        info!(
            ancestor = ancestor_height.0,
            depth,
            branch_len = branch.len(),
            "reorganising chain"
        );

        let mut undone: Vec<Arc<Block>> = Vec::with_capacity(depth as usize);
        for _ in 0..depth {
            undone.push(undo_with_retry(&mut state.ledger).await?);
        }

        let mut applied = 0u32;
        let mut failure: Option<BlockError> = None;
        for (offset, candidate) in branch.iter().enumerate() {
            let height = Height(ancestor_height.0 + 1 + offset as u32);
            match self.validate_and_apply(state, candidate, height).await {
                Ok(()) => applied += 1,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if let Some(error) = failure {
            // Roll back: strip the partially applied branch, then replay the
            // undone suffix (oldest first). The replayed blocks were valid
            // against exactly this state, so failure here is a node bug.
            warn!(%error, "reorganisation failed, restoring previous tip");
            for _ in 0..applied {
                undo_with_retry(&mut state.ledger).await?;
            }
            for original in undone.into_iter().rev() {
                let height = state
                    .ledger
                    .tip()?
                    .map(|(height, _)| height.succ())
                    .unwrap_or(Height::MIN);
                self.validate_and_apply(state, &original, height).await?;
            }
            return Err(error);
        }

        // The branch blocks are canonical now; drop them from the stash and
        // opportunistically re-admit the transactions the old suffix held.
        for candidate in &branch {
            state.side_blocks.remove(&candidate.hash());
        }
        let in_new_branch: HashSet<_> = branch
            .iter()
            .flat_map(|b| b.transactions.iter().map(|tx| tx.hash()))
            .collect();
        let now = Utc::now().timestamp().max(0) as u64;
        for old_block in &undone {
            for tx in &old_block.transactions {
                if tx.is_coinbase() || in_new_branch.contains(&tx.hash()) {
                    continue;
                }
                if let Err(error) = self.admit_locked(state, tx.clone(), now, now) {
                    debug!(%error, tx = %tx.hash(), "evicted transaction not re-admitted");
                }
            }
        }
        // The undone blocks become side blocks; they may win again later.
        for old_block in undone {
            stash_side_block(state, old_block);
        }

        metrics::counter!("consensus.reorg.count", 1);
        metrics::gauge!("consensus.reorg.depth", depth as f64);
        Ok(BlockOutcome::Reorg { depth })
    }

    /// Full contextual validation of `block` as the next block at `height`,
    /// followed by the storage unit of work.
    async fn validate_and_apply(
        &self,
        state: &mut EngineState,
        block: &Arc<Block>,
        height: Height,
    ) -> Result<(), BlockError> {
        let version = ConsensusVersion::current(self.network, height);
        let now = Utc::now();

        check::size_limits(block)?;
        let coinbase = check::coinbase_is_first(block)?;
        crate::transaction::check::coinbase_structure(coinbase)
            .map_err(BlockError::Transaction)?;

        let tx_hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
        check::merkle_root_validity(block, &tx_hashes)?;

        let (parent_hash, parent_timestamp) = match height.pred() {
            None => (GENESIS_PREVIOUS_BLOCK_HASH, 0),
            Some(parent_height) => {
                let parent = state
                    .ledger
                    .block(parent_height)?
                    .ok_or(StateError::Corrupt("parent block is missing"))?;
                (parent.hash(), parent.header.timestamp)
            }
        };

        check::time_is_valid(&block.header, parent_timestamp, now, version)?;
        let expected = self.expected_difficulty(&state.ledger, height)?;
        check::difficulty_claim(expected, &block.header)?;
        check::pow_is_valid(&parent_hash, &block.header)?;

        // Transaction validation with intra-block resolution: outputs of
        // earlier transactions in the same block are spendable.
        let coinbase = coinbase.clone();
        let mut in_block: HashMap<OutPoint, Output> = HashMap::new();
        let mut spent: HashSet<OutPoint> = HashSet::new();
        add_outputs(&mut in_block, &coinbase);

        let mut fees = Amount::ZERO;
        for tx in block.transactions.iter().skip(1) {
            crate::transaction::check::structure(tx).map_err(BlockError::Transaction)?;

            let mut resolved = Vec::with_capacity(tx.inputs.len());
            for input in &tx.inputs {
                if spent.contains(&input.outpoint) {
                    return Err(TransactionError::DoubleSpend(input.outpoint).into());
                }
                let output = match in_block.get(&input.outpoint) {
                    Some(output) => *output,
                    None => state
                        .ledger
                        .unspent_output(&input.outpoint)?
                        .ok_or(TransactionError::UnknownInput(input.outpoint))?,
                };
                spent.insert(input.outpoint);
                resolved.push(output);
            }

            crate::transaction::check::conservation(tx, &resolved)
                .map_err(BlockError::Transaction)?;
            crate::transaction::check::signatures(tx, &resolved, version)
                .map_err(BlockError::Transaction)?;

            fees = fees
                .checked_add(tx.fees)
                .map_err(|_| TransactionError::AmountOutOfRange)?;
            add_outputs(&mut in_block, tx);
        }

        let supply = state.ledger.supply()?;
        let reward = subsidy::block_reward(height, supply);
        crate::transaction::check::coinbase_value(&coinbase, reward, fees)
            .map_err(|_| BlockError::BadReward)?;

        let time_received = now.timestamp().max(0) as u64;
        apply_with_retry(&mut state.ledger, block, height, reward, time_received).await?;
        Ok(())
    }

    /// The difficulty the schedule demands for the block at `height`.
    fn expected_difficulty(
        &self,
        ledger: &LedgerState,
        height: Height,
    ) -> Result<denaro_chain::work::difficulty::Difficulty, BlockError> {
        let parent_height = match height.pred() {
            None => return Ok(self.network.start_difficulty()),
            Some(parent_height) => parent_height,
        };
        let parent = ledger
            .block(parent_height)?
            .ok_or(StateError::Corrupt("parent block is missing"))?;

        if !is_retarget_height(height.0) {
            return Ok(parent.header.difficulty);
        }

        let window_start = ledger
            .block(Height(height.0 - denaro_chain::parameters::RETARGET_INTERVAL))?
            .ok_or(StateError::Corrupt("retarget window start is missing"))?;
        Ok(next_difficulty(
            parent.header.difficulty,
            window_start.header.timestamp,
            parent.header.timestamp,
        ))
    }

    // ===== Mempool =====

    /// Admit a transaction to the pending pool. Takes the chain lock briefly
    /// so admission serializes with block application.
    pub async fn admit_transaction(
        &self,
        tx: Arc<Transaction>,
        propagation_time: u64,
    ) -> Result<(), TransactionError> {
        let mut state = self.state.lock().await;
        let now = Utc::now().timestamp().max(0) as u64;
        self.admit_locked(&mut state, tx, propagation_time, now)
    }

    fn admit_locked(
        &self,
        state: &mut EngineState,
        tx: Arc<Transaction>,
        propagation_time: u64,
        now: u64,
    ) -> Result<(), TransactionError> {
        let hash = tx.hash();
        if state.ledger.mempool().contains(&hash) {
            return Ok(());
        }
        if tx.is_coinbase() {
            return Err(TransactionError::InvalidStructure(
                "coinbase cannot enter the pending pool",
            ));
        }
        crate::transaction::check::structure(&tx)?;

        // Resolve against the UTXO set plus the outputs of pending
        // transactions, rejecting anything already reserved.
        let mut resolved = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if state.ledger.mempool().reservation(&input.outpoint).is_some() {
                return Err(TransactionError::DoubleSpend(input.outpoint));
            }
            let output = match state
                .ledger
                .unspent_output(&input.outpoint)
                .map_err(|_| TransactionError::UnknownInput(input.outpoint))?
            {
                Some(output) => output,
                None => state
                    .ledger
                    .mempool()
                    .pending_output(&input.outpoint)
                    .ok_or(TransactionError::UnknownInput(input.outpoint))?,
            };
            resolved.push(output);
        }

        crate::transaction::check::conservation(&tx, &resolved)?;
        let next_height = match state.ledger.tip().ok().flatten() {
            Some((height, _)) => height.succ(),
            None => Height::MIN,
        };
        let version = ConsensusVersion::current(self.network, next_height);
        crate::transaction::check::signatures(&tx, &resolved, version)?;

        let input_addresses = resolved.iter().map(|output| output.address).collect();
        let entry = MempoolEntry::new(tx, now, propagation_time, input_addresses);
        match state.ledger.admit_pending(entry) {
            Ok(evicted) => {
                if let Some(evicted) = evicted {
                    debug!(%evicted, "evicted cheapest pending transaction");
                }
                Ok(())
            }
            Err(StateError::MempoolFull) => Err(TransactionError::MempoolFull),
            Err(StateError::ReservationConflict(outpoint)) => {
                Err(TransactionError::DoubleSpend(outpoint))
            }
            Err(error) => {
                warn!(%error, "mempool admission failed in storage");
                Err(TransactionError::InvalidStructure("storage failure"))
            }
        }
    }

    /// Drop pending transactions older than the expiry window.
    pub async fn collect_mempool_garbage(&self, expiry_secs: u64) -> Result<usize, StateError> {
        let mut state = self.state.lock().await;
        let now = Utc::now().timestamp().max(0) as u64;
        let cutoff = now.saturating_sub(expiry_secs);
        let expired = state.ledger.mempool().expired(cutoff);
        let count = expired.len();
        for hash in expired {
            state.ledger.remove_pending(&hash)?;
        }
        if count > 0 {
            debug!(count, "expired pending transactions dropped");
        }
        Ok(count)
    }

    // ===== Queries =====

    pub async fn tip(&self) -> Result<Option<(Height, block::Hash)>, StateError> {
        self.state.lock().await.ledger.tip()
    }

    pub async fn block(
        &self,
        hash_or_height: impl Into<denaro_state::HashOrHeight>,
    ) -> Result<Option<Arc<Block>>, StateError> {
        self.state.lock().await.ledger.block(hash_or_height)
    }

    pub async fn block_range(
        &self,
        lo: Height,
        hi: Height,
        max_blocks: usize,
    ) -> Result<Vec<Arc<Block>>, StateError> {
        self.state
            .lock()
            .await
            .ledger
            .block_range(lo, hi, max_blocks)
    }

    pub async fn transaction(
        &self,
        hash: &denaro_chain::transaction::Hash,
    ) -> Result<Option<(block::Hash, Arc<Transaction>)>, StateError> {
        self.state.lock().await.ledger.transaction(hash)
    }

    pub async fn supply(&self) -> Result<Amount, StateError> {
        self.state.lock().await.ledger.supply()
    }

    pub async fn pending_transactions(&self) -> Vec<Arc<Transaction>> {
        let state = self.state.lock().await;
        state
            .ledger
            .mempool()
            .ordered()
            .into_iter()
            .map(|entry| entry.transaction.clone())
            .collect()
    }

    pub async fn block_locator(&self) -> Result<Vec<(Height, block::Hash)>, StateError> {
        self.state.lock().await.ledger.block_locator()
    }

    pub async fn locator_intersection(
        &self,
        locator: &[(Height, block::Hash)],
    ) -> Result<Option<Height>, StateError> {
        self.state.lock().await.ledger.locator_intersection(locator)
    }

    pub async fn unspent_for_address(
        &self,
        address: &denaro_chain::address::Address,
    ) -> Result<Vec<(OutPoint, Amount)>, StateError> {
        self.state.lock().await.ledger.unspent_for_address(address)
    }

    /// Assemble everything a miner needs for the next block.
    pub async fn mining_info(&self) -> Result<MiningInfo, BlockError> {
        let state = self.state.lock().await;
        let (height, previous_hash) = match state.ledger.tip()? {
            Some((height, hash)) => (height.succ(), hash),
            None => (Height::MIN, GENESIS_PREVIOUS_BLOCK_HASH),
        };
        let difficulty = self.expected_difficulty(&state.ledger, height)?;
        let reward = subsidy::block_reward(height, state.ledger.supply()?);
        let transactions = state.ledger.mempool().select_template(
            |outpoint| state.ledger.is_unspent(outpoint),
            denaro_chain::block::MAX_TX_DATA_HEX,
        );
        Ok(MiningInfo {
            previous_hash,
            height,
            difficulty,
            reward,
            transactions,
        })
    }

    /// Flush storage; used during graceful shutdown.
    pub async fn flush(&self) -> Result<(), StateError> {
        self.state.lock().await.ledger.flush()
    }
}

/// Walk a submitted block back to the canonical chain through the side
/// stash. Returns the fork point height and the branch, oldest first,
/// ending with the submitted block.
fn build_branch(
    state: &EngineState,
    block: &Arc<Block>,
) -> Result<Option<(Height, Vec<Arc<Block>>)>, StateError> {
    let mut branch = vec![block.clone()];
    let mut parent_hash = block.header.previous_hash;

    loop {
        if let Some(height) = state.ledger.height_by_hash(&parent_hash)? {
            branch.reverse();
            return Ok(Some((height, branch)));
        }
        match state.side_blocks.get(&parent_hash) {
            Some(parent) => {
                if branch.len() >= MAX_SIDE_BLOCKS {
                    return Ok(None);
                }
                branch.push(parent.clone());
                parent_hash = parent.header.previous_hash;
            }
            None => return Ok(None),
        }
    }
}

fn stash_side_block(state: &mut EngineState, block: Arc<Block>) {
    if state.side_blocks.len() >= MAX_SIDE_BLOCKS {
        // Evict the stashed block with the lowest claimed difficulty; the
        // stash is best-effort and a pruned branch can be re-pushed.
        if let Some(evict) = state
            .side_blocks
            .iter()
            .min_by_key(|(_, b)| b.header.difficulty)
            .map(|(hash, _)| *hash)
        {
            state.side_blocks.remove(&evict);
        }
    }
    state.side_blocks.insert(block.hash(), block);
}

fn add_outputs(in_block: &mut HashMap<OutPoint, Output>, tx: &Arc<Transaction>) {
    let hash = tx.hash();
    for (index, output) in tx.outputs.iter().enumerate() {
        in_block.insert(
            OutPoint {
                hash,
                index: index as u8,
            },
            *output,
        );
    }
}

/// Apply a block, retrying with backoff when storage reports itself
/// unavailable. Validation errors surface immediately.
async fn apply_with_retry(
    ledger: &mut LedgerState,
    block: &Arc<Block>,
    height: Height,
    reward: Amount,
    time_received: u64,
) -> Result<(), BlockError> {
    let mut attempt = 0;
    loop {
        match ledger.apply_block(block, height, reward, time_received) {
            Err(StateError::Unavailable(error)) if attempt < STORAGE_RETRIES => {
                warn!(%error, attempt, "storage unavailable during apply, backing off");
                tokio::time::sleep(std::time::Duration::from_millis(
                    STORAGE_RETRY_BASE_MS << attempt,
                ))
                .await;
                attempt += 1;
            }
            other => return other.map_err(BlockError::State),
        }
    }
}

async fn undo_with_retry(ledger: &mut LedgerState) -> Result<Arc<Block>, BlockError> {
    let mut attempt = 0;
    loop {
        match ledger.undo_tip_block() {
            Err(StateError::Unavailable(error)) if attempt < STORAGE_RETRIES => {
                warn!(%error, attempt, "storage unavailable during undo, backing off");
                tokio::time::sleep(std::time::Duration::from_millis(
                    STORAGE_RETRY_BASE_MS << attempt,
                ))
                .await;
                attempt += 1;
            }
            other => return other.map_err(BlockError::State),
        }
    }
}
