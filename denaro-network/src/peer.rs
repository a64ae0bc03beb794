//! Peer records and reputation scoring.

use crate::constants::{BAN_BASE_SECS, BAN_SCORE};

/// What a peer did, and what it costs or earns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReputationEvent {
    /// Relayed a block or transaction that validated.
    ValidRelay,
    /// Sent a payload that failed validation.
    InvalidPayload,
    /// Sent a signed envelope that failed authentication.
    MalformedEnvelope,
    /// Broke the protocol outright.
    ProtocolViolation,
}

impl ReputationEvent {
    pub fn score_delta(self) -> i32 {
        match self {
            ReputationEvent::ValidRelay => 1,
            ReputationEvent::InvalidPayload => -5,
            ReputationEvent::MalformedEnvelope => -20,
            ReputationEvent::ProtocolViolation => -50,
        }
    }
}

/// One known peer, persisted across restarts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerRecord {
    /// 64 hex characters: SHA-256 of the peer's compressed public key.
    pub node_id: String,
    /// Compressed public key, hex.
    pub pubkey: String,
    pub url: String,
    pub is_public: bool,
    pub node_version: String,
    pub reputation: i32,
    pub last_seen: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_until: Option<u64>,
    #[serde(default)]
    pub ban_count: u32,
}

impl PeerRecord {
    pub fn is_banned(&self, now: u64) -> bool {
        matches!(self.banned_until, Some(until) if until > now)
    }

    pub fn touch(&mut self, now: u64) {
        self.last_seen = now;
    }

    /// Apply a reputation event; crossing the ban threshold bans the peer
    /// for a duration that doubles on each re-ban, and resets the score so
    /// the next offense period starts clean.
    pub fn apply_event(&mut self, event: ReputationEvent, now: u64) {
        self.reputation = self.reputation.saturating_add(event.score_delta());
        self.last_seen = now;

        if self.reputation <= BAN_SCORE {
            let duration = BAN_BASE_SECS.saturating_mul(1u64 << self.ban_count.min(20));
            self.ban_count = self.ban_count.saturating_add(1);
            self.banned_until = Some(now + duration);
            self.reputation = 0;
        }
    }
}
