//! The synchroniser: handshakes, pull sync, push propagation.
//!
//! Pull sync reconciles chains with a sparse locator, then streams forward
//! ranges through the consensus engine. A one-permit semaphore makes sync
//! cycles single-flight: concurrent triggers fail fast with
//! `SyncInProgress`. Push propagation fans out in parallel and tolerates
//! individual peer failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use denaro_chain::block::Block;
use denaro_chain::transaction::Transaction;
use denaro_consensus::{BlockOutcome, ChainEngine};

use crate::client::PeerClient;
use crate::constants::*;
use crate::envelope::SignedEnvelope;
use crate::identity::{NodeId, NodeIdentity};
use crate::peer::{PeerRecord, ReputationEvent};
use crate::protocol::{
    block_from_hex, block_to_hex, transaction_from_hex, transaction_to_hex, LocatorEntry,
    StatusResponse, SyncRequest, SyncResponse,
};
use crate::registry::PeerRegistry;
use crate::NetworkError;

pub struct Synchroniser {
    engine: Arc<ChainEngine>,
    registry: Arc<PeerRegistry>,
    client: PeerClient,
    identity: Arc<NodeIdentity>,
    sync_permit: Semaphore,
}

impl std::fmt::Debug for Synchroniser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchroniser").finish()
    }
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

impl Synchroniser {
    pub fn new(
        engine: Arc<ChainEngine>,
        registry: Arc<PeerRegistry>,
        identity: Arc<NodeIdentity>,
    ) -> Result<Synchroniser, NetworkError> {
        let client = PeerClient::new(identity.clone())?;
        Ok(Synchroniser {
            engine,
            registry,
            client,
            identity,
            sync_permit: Semaphore::new(MAX_CONCURRENT_SYNCS),
        })
    }

    pub fn engine(&self) -> &Arc<ChainEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn identity(&self) -> &Arc<NodeIdentity> {
        &self.identity
    }

    // ===== Inbound authentication =====

    /// Authenticate a signed peer request: envelope verification, ban
    /// check, and bookkeeping. Failures cost the claimed peer reputation.
    pub fn authenticate_peer(
        &self,
        envelope: &SignedEnvelope,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<NodeId, NetworkError> {
        let now = unix_now();
        let peer = match envelope.verify(method, path, body, Utc::now()) {
            Ok(peer) => peer,
            Err(error) => {
                // The claimed id may be forged, but penalizing it is still
                // correct: a real peer never fails its own envelope.
                if let Ok(claimed) = NodeId::from_hex(&envelope.node_id) {
                    let _ = self
                        .registry
                        .record_event(&claimed, ReputationEvent::MalformedEnvelope, now);
                }
                return Err(error.into());
            }
        };
        if self.registry.is_banned(&peer, now) {
            return Err(NetworkError::PeerBanned);
        }
        self.registry.touch(&peer, now)?;
        Ok(peer)
    }

    // ===== Handshake and discovery =====

    /// Contact a peer, record it, and pull its chain when it is ahead.
    pub async fn handshake(&self, url: &str) -> Result<StatusResponse, NetworkError> {
        let status = self.client.get_status(url).await?;
        let now = unix_now();

        let record = PeerRecord {
            node_id: status.node_id.clone(),
            pubkey: status.pubkey.clone(),
            url: status.url.clone().unwrap_or_else(|| url.to_string()),
            is_public: status.is_public,
            node_version: status.node_version.clone(),
            reputation: 0,
            last_seen: now,
            banned_until: None,
            ban_count: 0,
        };
        self.registry.upsert(record.clone())?;

        let local_height = self
            .engine
            .tip()
            .await?
            .map(|(height, _)| height.0)
            .unwrap_or(0);
        if status.height > local_height {
            match self.sync_from(&record, status.height).await {
                Ok(applied) => info!(peer = %record.node_id, applied, "pull sync finished"),
                Err(NetworkError::SyncInProgress) => {
                    debug!(peer = %record.node_id, "sync already running, skipping")
                }
                Err(error) => warn!(peer = %record.node_id, %error, "pull sync failed"),
            }
        }
        Ok(status)
    }

    /// The periodic discovery loop: probe a few random peers, follow longer
    /// chains. Runs until the shutdown signal flips.
    pub async fn run_discovery(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(DISCOVERY_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let peers = self.registry.sample(DISCOVERY_FANOUT, unix_now(), None);
                    for peer in peers {
                        if let Err(error) = self.handshake(&peer.url).await {
                            debug!(peer = %peer.node_id, %error, "discovery handshake failed");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    // ===== Pull sync =====

    /// Run one single-flight pull-sync cycle against `peer`.
    ///
    /// Returns the number of blocks accepted. The cycle carries a deadline
    /// proportional to how far behind we are; on expiry it aborts cleanly
    /// and releases the single-flight permit.
    pub async fn sync_from(
        &self,
        peer: &PeerRecord,
        remote_height: u32,
    ) -> Result<usize, NetworkError> {
        let _permit = self
            .sync_permit
            .try_acquire()
            .map_err(|_| NetworkError::SyncInProgress)?;

        let local_height = self
            .engine
            .tip()
            .await?
            .map(|(height, _)| height.0)
            .unwrap_or(0);
        let behind = remote_height.saturating_sub(local_height) as u64;
        let deadline = SYNC_BASE_DEADLINE + Duration::from_millis(SYNC_PER_BLOCK_MS * behind);

        metrics::counter!("network.sync.cycles", 1);
        match tokio::time::timeout(deadline, self.pull_from(peer)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(peer = %peer.node_id, "sync cycle exceeded its deadline");
                Err(NetworkError::Timeout)
            }
        }
    }

    async fn pull_from(&self, peer: &PeerRecord) -> Result<usize, NetworkError> {
        let now = unix_now();
        let peer_id = NodeId::from_hex(&peer.node_id)?;

        // Locate the common ancestor with a sparse locator.
        let locator = self
            .engine
            .block_locator()
            .await?
            .into_iter()
            .map(|(height, hash)| LocatorEntry {
                height: height.0,
                hash: hash.to_hex(),
            })
            .collect();
        let response = self
            .client
            .sync_blockchain(&peer.url, &SyncRequest { locator })
            .await?;
        let mut next = response.common_height.unwrap_or(0) + 1;

        // Stream forward batches through the engine.
        let mut applied = 0usize;
        loop {
            let batch = self
                .client
                .get_blocks(&peer.url, next, SYNC_BATCH_BLOCKS)
                .await?;
            if batch.blocks.is_empty() {
                break;
            }

            let mut decoded_bytes = 0usize;
            let mut blocks = Vec::with_capacity(batch.blocks.len());
            for raw in &batch.blocks {
                decoded_bytes += raw.len() / 2;
                if decoded_bytes > MAX_BATCH_BYTES {
                    self.registry
                        .record_event(&peer_id, ReputationEvent::ProtocolViolation, now)?;
                    return Err(NetworkError::MalformedPayload(
                        "sync batch exceeds the byte bound",
                    ));
                }
                match block_from_hex(raw) {
                    Ok(block) => blocks.push(block),
                    Err(error) => {
                        self.registry
                            .record_event(&peer_id, ReputationEvent::InvalidPayload, now)?;
                        return Err(error);
                    }
                }
            }

            let batch_len = blocks.len();
            let (outcomes, failure) = self.engine.submit_blocks(blocks).await;
            applied += outcomes
                .iter()
                .filter(|outcome| !matches!(outcome, BlockOutcome::Stale))
                .count();
            if let Some(error) = failure {
                if error.is_peer_fault() {
                    self.registry
                        .record_event(&peer_id, ReputationEvent::InvalidPayload, now)?;
                }
                return Err(error.into());
            }

            if batch_len < SYNC_BATCH_BLOCKS as usize {
                break;
            }
            next += batch_len as u32;
        }

        if applied > 0 {
            self.registry
                .record_event(&peer_id, ReputationEvent::ValidRelay, now)?;
            metrics::counter!("network.sync.blocks", applied as u64);
        }
        Ok(applied)
    }

    /// Serve the reconciliation half of a peer's pull sync.
    pub async fn serve_sync(&self, request: &SyncRequest) -> Result<SyncResponse, NetworkError> {
        let mut locator = Vec::with_capacity(request.locator.len());
        for entry in &request.locator {
            let hash = entry
                .hash
                .parse()
                .map_err(|_| NetworkError::MalformedPayload("locator hash is not hex"))?;
            locator.push((denaro_chain::block::Height(entry.height), hash));
        }
        let common = self.engine.locator_intersection(&locator).await?;
        Ok(SyncResponse {
            common_height: common.map(|height| height.0),
        })
    }

    // ===== Push propagation =====

    /// Handle a block pushed by an authenticated peer: validate, score the
    /// sender, and relay onward when it advanced the chain.
    pub async fn receive_pushed_block(
        self: &Arc<Self>,
        peer: NodeId,
        block_hex: &str,
    ) -> Result<BlockOutcome, NetworkError> {
        let now = unix_now();
        let block = match block_from_hex(block_hex) {
            Ok(block) => block,
            Err(error) => {
                self.registry
                    .record_event(&peer, ReputationEvent::InvalidPayload, now)?;
                return Err(error);
            }
        };

        match self.engine.submit_block(block.clone()).await {
            Ok(outcome) => {
                if !matches!(outcome, BlockOutcome::Stale) {
                    self.registry
                        .record_event(&peer, ReputationEvent::ValidRelay, now)?;
                }
                if matches!(
                    outcome,
                    BlockOutcome::Applied | BlockOutcome::Reorg { .. }
                ) {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.propagate_block(&block, Some(peer)).await;
                    });
                }
                Ok(outcome)
            }
            Err(error) => {
                if error.is_peer_fault() {
                    self.registry
                        .record_event(&peer, ReputationEvent::InvalidPayload, now)?;
                }
                Err(error.into())
            }
        }
    }

    /// Handle a signed batch push (`/push_blocks`): a contiguous chain of
    /// blocks from one peer, validated front to back.
    pub async fn receive_pushed_blocks(
        self: &Arc<Self>,
        peer: NodeId,
        blocks_hex: &[String],
    ) -> Result<Vec<BlockOutcome>, NetworkError> {
        let now = unix_now();
        let mut blocks = Vec::with_capacity(blocks_hex.len());
        for raw in blocks_hex {
            match block_from_hex(raw) {
                Ok(block) => blocks.push(block),
                Err(error) => {
                    self.registry
                        .record_event(&peer, ReputationEvent::InvalidPayload, now)?;
                    return Err(error);
                }
            }
        }

        let (outcomes, failure) = self.engine.submit_blocks(blocks).await;
        match failure {
            None => {
                if outcomes
                    .iter()
                    .any(|outcome| !matches!(outcome, BlockOutcome::Stale))
                {
                    self.registry
                        .record_event(&peer, ReputationEvent::ValidRelay, now)?;
                }
                Ok(outcomes)
            }
            Some(error) => {
                if error.is_peer_fault() {
                    self.registry
                        .record_event(&peer, ReputationEvent::InvalidPayload, now)?;
                }
                Err(error.into())
            }
        }
    }

    /// Serve `/handshake/challenge`: a fresh random nonce.
    pub fn serve_challenge(&self) -> crate::protocol::ChallengeResponse {
        let mut nonce = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut nonce[..]);
        crate::protocol::ChallengeResponse {
            challenge: hex::encode(nonce),
        }
    }

    /// Handle a transaction pushed by an authenticated peer.
    pub async fn receive_pushed_transaction(
        self: &Arc<Self>,
        peer: NodeId,
        tx_hex: &str,
    ) -> Result<(), NetworkError> {
        let now = unix_now();
        let tx = match transaction_from_hex(tx_hex) {
            Ok(tx) => tx,
            Err(error) => {
                self.registry
                    .record_event(&peer, ReputationEvent::InvalidPayload, now)?;
                return Err(error);
            }
        };

        match self.engine.admit_transaction(tx.clone(), now).await {
            Ok(()) => {
                self.registry
                    .record_event(&peer, ReputationEvent::ValidRelay, now)?;
                let this = self.clone();
                tokio::spawn(async move {
                    this.propagate_transaction(&tx, Some(peer)).await;
                });
                Ok(())
            }
            Err(error) => {
                self.registry
                    .record_event(&peer, ReputationEvent::InvalidPayload, now)?;
                Err(denaro_consensus::BlockError::Transaction(error).into())
            }
        }
    }

    /// Push a freshly accepted block to a sample of peers, in parallel.
    /// Individual failures are logged and ignored; a send settles on a 2xx
    /// or on the per-request timeout.
    pub async fn propagate_block(&self, block: &Block, exclude: Option<NodeId>) {
        let hex = block_to_hex(block);
        let peers = self
            .registry
            .sample(PROPAGATION_FANOUT, unix_now(), exclude.as_ref());

        let sends = peers.into_iter().map(|peer| {
            let hex = hex.clone();
            let client = &self.client;
            async move {
                if let Err(error) = client.push_block(&peer.url, hex).await {
                    debug!(peer = %peer.node_id, %error, "block push failed");
                }
            }
        });
        join_all(sends).await;
    }

    pub async fn propagate_transaction(&self, tx: &Transaction, exclude: Option<NodeId>) {
        let hex = transaction_to_hex(tx);
        let peers = self
            .registry
            .sample(PROPAGATION_FANOUT, unix_now(), exclude.as_ref());

        let sends = peers.into_iter().map(|peer| {
            let hex = hex.clone();
            let client = &self.client;
            async move {
                if let Err(error) = client.push_tx(&peer.url, hex).await {
                    debug!(peer = %peer.node_id, %error, "transaction push failed");
                }
            }
        });
        join_all(sends).await;
    }
}
