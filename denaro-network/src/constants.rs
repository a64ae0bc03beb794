//! Protocol-wide constants for peer management and synchronisation.

use std::time::Duration;

/// Timeout for a single outbound peer request.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the discovery task probes random peers.
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);

/// Peers probed per discovery round.
pub const DISCOVERY_FANOUT: usize = 2;

/// Peers a freshly accepted block is pushed to.
pub const PROPAGATION_FANOUT: usize = 8;

/// Active peers kept in memory.
pub const MAX_PEERS: usize = 64;

/// Peers kept in the durable table.
pub const MAX_PEERS_COUNT: usize = 256;

/// Peers silent for longer than this are pruned.
pub const PEER_INACTIVITY_SECS: u64 = 7 * 24 * 3600;

/// Only one sync cycle may run at a time.
pub const MAX_CONCURRENT_SYNCS: usize = 1;

/// Upper bound on the decoded size of one pull-sync batch.
pub const MAX_BATCH_BYTES: usize = 20 * 1024 * 1024;

/// Blocks requested per pull-sync round trip.
pub const SYNC_BATCH_BLOCKS: u32 = 512;

/// A sync cycle gets this long, plus a per-block allowance.
pub const SYNC_BASE_DEADLINE: Duration = Duration::from_secs(30);
pub const SYNC_PER_BLOCK_MS: u64 = 50;

/// Maximum clock skew accepted on a signed peer request.
pub const ENVELOPE_MAX_SKEW_SECS: i64 = 30;

/// Default public-endpoint rate limit, per minute per caller.
pub const PUBLIC_RATE_PER_MINUTE: u32 = 60;

/// Reputation at or below this bans the peer.
pub const BAN_SCORE: i32 = -100;

/// First ban duration; doubles on every subsequent ban.
pub const BAN_BASE_SECS: u64 = 3600;

/// The node version advertised in handshakes and envelopes.
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");
