//! The peer registry: an in-memory table over the durable peer relation.
//!
//! Mutations take a per-peer lock; there is no global write lock around
//! reputation updates. The registry is a cache: it is rebuilt from the peer
//! store at startup and written through on every change.

use std::sync::{Arc, Mutex, RwLock};

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use denaro_state::PeerStore;

use crate::constants::{MAX_PEERS, MAX_PEERS_COUNT, PEER_INACTIVITY_SECS};
use crate::identity::NodeId;
use crate::peer::{PeerRecord, ReputationEvent};
use crate::NetworkError;

/// Aggregate peer counts, served with the peer list.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PeerStats {
    pub known: usize,
    pub public: usize,
    pub banned: usize,
}

pub struct PeerRegistry {
    peers: RwLock<IndexMap<String, Arc<Mutex<PeerRecord>>>>,
    store: PeerStore,
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry").finish()
    }
}

impl PeerRegistry {
    /// Load persisted peers, dropping records that have gone stale.
    pub fn load(store: PeerStore, now: u64) -> Result<PeerRegistry, NetworkError> {
        let mut records: Vec<PeerRecord> = Vec::new();
        for row in store.rows()? {
            match serde_json::from_slice::<PeerRecord>(&row) {
                Ok(record) => records.push(record),
                Err(error) => warn!(%error, "dropping undecodable peer row"),
            }
        }

        // Inactivity pruning, then LRU down to the in-memory cap.
        records.retain(|record| now.saturating_sub(record.last_seen) <= PEER_INACTIVITY_SECS);
        records.sort_by_key(|record| std::cmp::Reverse(record.last_seen));
        records.truncate(MAX_PEERS);

        let peers = records
            .into_iter()
            .map(|record| (record.node_id.clone(), Arc::new(Mutex::new(record))))
            .collect();
        Ok(PeerRegistry {
            peers: RwLock::new(peers),
            store,
        })
    }

    pub fn len(&self) -> usize {
        self.peers.read().expect("peer table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or refresh a peer after a successful handshake or signed
    /// request.
    pub fn upsert(&self, record: PeerRecord) -> Result<(), NetworkError> {
        let key = record.node_id.clone();
        let mut updated = record.clone();
        {
            let mut table = self.peers.write().expect("peer table lock poisoned");
            if let Some(existing) = table.get(&key) {
                let mut existing = existing.lock().expect("peer lock poisoned");
                // Never let a handshake reset standing reputation or bans.
                updated.reputation = existing.reputation;
                updated.banned_until = existing.banned_until;
                updated.ban_count = existing.ban_count;
                *existing = updated.clone();
            } else {
                if table.len() >= MAX_PEERS {
                    evict_lru(&mut table);
                }
                table.insert(key.clone(), Arc::new(Mutex::new(updated.clone())));
            }
        }
        self.persist(&updated)
    }

    /// Apply a reputation event to a known peer.
    pub fn record_event(
        &self,
        node_id: &NodeId,
        event: ReputationEvent,
        now: u64,
    ) -> Result<(), NetworkError> {
        let entry = {
            let table = self.peers.read().expect("peer table lock poisoned");
            table.get(&node_id.to_hex()).cloned()
        };
        let entry = match entry {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let snapshot = {
            let mut record = entry.lock().expect("peer lock poisoned");
            record.apply_event(event, now);
            if record.is_banned(now) {
                debug!(peer = %record.node_id, until = ?record.banned_until, "peer banned");
                metrics::counter!("network.peer.banned", 1);
            }
            record.clone()
        };
        self.persist(&snapshot)
    }

    pub fn is_banned(&self, node_id: &NodeId, now: u64) -> bool {
        let table = self.peers.read().expect("peer table lock poisoned");
        table
            .get(&node_id.to_hex())
            .map(|entry| entry.lock().expect("peer lock poisoned").is_banned(now))
            .unwrap_or(false)
    }

    pub fn touch(&self, node_id: &NodeId, now: u64) -> Result<(), NetworkError> {
        let entry = {
            let table = self.peers.read().expect("peer table lock poisoned");
            table.get(&node_id.to_hex()).cloned()
        };
        if let Some(entry) = entry {
            let snapshot = {
                let mut record = entry.lock().expect("peer lock poisoned");
                record.touch(now);
                record.clone()
            };
            self.persist(&snapshot)?;
        }
        Ok(())
    }

    /// A random sample of peer URLs eligible for outbound calls.
    pub fn sample(&self, count: usize, now: u64, exclude: Option<&NodeId>) -> Vec<PeerRecord> {
        let table = self.peers.read().expect("peer table lock poisoned");
        let excluded = exclude.map(|id| id.to_hex());
        let candidates: Vec<PeerRecord> = table
            .values()
            .map(|entry| entry.lock().expect("peer lock poisoned").clone())
            .filter(|record| !record.is_banned(now))
            .filter(|record| Some(&record.node_id) != excluded.as_ref())
            .collect();

        candidates
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect()
    }

    /// Every known peer, optionally including banned ones.
    pub fn list(&self, include_banned: bool, now: u64) -> Vec<PeerRecord> {
        let table = self.peers.read().expect("peer table lock poisoned");
        table
            .values()
            .map(|entry| entry.lock().expect("peer lock poisoned").clone())
            .filter(|record| include_banned || !record.is_banned(now))
            .collect()
    }

    /// Aggregate counts for the peer-list endpoint's stats view.
    pub fn stats(&self, now: u64) -> PeerStats {
        let all = self.list(true, now);
        PeerStats {
            known: all.len(),
            public: all.iter().filter(|record| record.is_public).count(),
            banned: all.iter().filter(|record| record.is_banned(now)).count(),
        }
    }

    fn persist(&self, record: &PeerRecord) -> Result<(), NetworkError> {
        let mut id = [0u8; 32];
        if hex::decode_to_slice(&record.node_id, &mut id).is_err() {
            return Err(NetworkError::MalformedPayload("peer row has a bad node id"));
        }
        let row = serde_json::to_vec(record)
            .map_err(|_| NetworkError::MalformedPayload("peer row failed to encode"))?;
        self.store.upsert(&id, &row)?;

        // Bound the durable table as well, LRU by last_seen.
        if self.store.len() > MAX_PEERS_COUNT {
            self.prune_store()?;
        }
        Ok(())
    }

    fn prune_store(&self) -> Result<(), NetworkError> {
        let mut rows: Vec<PeerRecord> = Vec::new();
        for row in self.store.rows()? {
            if let Ok(record) = serde_json::from_slice::<PeerRecord>(&row) {
                rows.push(record);
            }
        }
        rows.sort_by_key(|record| record.last_seen);
        let excess = rows.len().saturating_sub(MAX_PEERS_COUNT);
        for record in rows.into_iter().take(excess) {
            let mut id = [0u8; 32];
            if hex::decode_to_slice(&record.node_id, &mut id).is_ok() {
                self.store.remove(&id)?;
            }
        }
        Ok(())
    }
}

fn evict_lru(table: &mut IndexMap<String, Arc<Mutex<PeerRecord>>>) {
    let lru = table
        .iter()
        .min_by_key(|(_, entry)| entry.lock().expect("peer lock poisoned").last_seen)
        .map(|(key, _)| key.clone());
    if let Some(key) = lru {
        table.shift_remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use denaro_chain::parameters::Network;
    use denaro_state::{Config, LedgerState};

    fn registry() -> PeerRegistry {
        denaro_test::init();
        let ledger = LedgerState::new(&Config::ephemeral(), Network::Regtest).unwrap();
        PeerRegistry::load(ledger.peer_store(), 0).unwrap()
    }

    fn record(id_byte: u8, last_seen: u64) -> PeerRecord {
        PeerRecord {
            node_id: hex::encode([id_byte; 32]),
            pubkey: "02".repeat(33),
            url: format!("http://peer-{}.example:3006", id_byte),
            is_public: true,
            node_version: "0.1.0".to_string(),
            reputation: 0,
            last_seen,
            banned_until: None,
            ban_count: 0,
        }
    }

    #[test]
    fn upsert_preserves_reputation() {
        let registry = registry();
        registry.upsert(record(1, 10)).unwrap();

        let id = NodeId([1; 32]);
        registry
            .record_event(&id, ReputationEvent::InvalidPayload, 11)
            .unwrap();

        // A re-handshake must not launder the score away.
        registry.upsert(record(1, 12)).unwrap();
        let peers = registry.list(true, 12);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].reputation, -5);
    }

    #[test]
    fn banned_peers_are_not_sampled() {
        let registry = registry();
        registry.upsert(record(1, 10)).unwrap();
        registry.upsert(record(2, 10)).unwrap();

        let id = NodeId([1; 32]);
        for _ in 0..2 {
            registry
                .record_event(&id, ReputationEvent::ProtocolViolation, 20)
                .unwrap();
        }
        assert!(registry.is_banned(&id, 21));

        let sample = registry.sample(10, 21, None);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].node_id, hex::encode([2u8; 32]));
    }

    #[test]
    fn in_memory_table_is_capped_with_lru_eviction() {
        let registry = registry();
        for byte in 0..(MAX_PEERS + 1) as u8 {
            registry.upsert(record(byte, byte as u64)).unwrap();
        }
        assert_eq!(registry.len(), MAX_PEERS);

        // The peer with the oldest last_seen (byte 0) was evicted.
        let listed = registry.list(true, 1000);
        assert!(!listed
            .iter()
            .any(|record| record.node_id == hex::encode([0u8; 32])));
    }

    #[test]
    fn stale_rows_are_dropped_on_load() {
        denaro_test::init();
        let ledger = LedgerState::new(&Config::ephemeral(), Network::Regtest).unwrap();
        let store = ledger.peer_store();

        let now = PEER_INACTIVITY_SECS + 100;
        let fresh = record(1, now - 10);
        let stale = record(2, 50);
        for record in [&fresh, &stale] {
            let mut id = [0u8; 32];
            hex::decode_to_slice(&record.node_id, &mut id).unwrap();
            store
                .upsert(&id, &serde_json::to_vec(record).unwrap())
                .unwrap();
        }

        let registry = PeerRegistry::load(store, now).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list(true, now)[0].node_id, fresh.node_id);
    }
}
