use std::io;

use denaro_serde_derive::DenaroSerialize;

use crate::address::Address;
use crate::cached::Cached;
use crate::work::difficulty::Difficulty;
use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

use super::{merkle, Hash};

/// A block header.
///
/// The header *is* the hashed content: `previous_hash ‖ merkle_root ‖
/// miner address ‖ timestamp ‖ difficulty ‖ nonce`, in that order. Miners vary
/// `nonce` (and, within bounds, `timestamp`) until the hash of these bytes
/// satisfies the difficulty predicate against the parent hash.
#[derive(Clone, Copy, Debug, Eq, PartialEq, DenaroSerialize)]
pub struct Header {
    /// Hash of the parent block; the all-zero sentinel for genesis.
    pub previous_hash: Hash,

    /// Commitment to the ordered transaction hashes of the block.
    pub merkle_root: merkle::Root,

    /// Address the block reward and fees are paid to.
    pub address: Address,

    /// Unix seconds when the miner started hashing, by its own clock.
    /// Must be monotone non-decreasing along the chain.
    pub timestamp: u64,

    /// The difficulty this block claims to satisfy. Must match the retarget
    /// schedule exactly.
    pub difficulty: Difficulty,

    /// Free variable of the proof-of-work search.
    pub nonce: u64,

    /// Memoized hash of the fields above; never serialized.
    hash: Cached<Hash>,
}

impl Header {
    /// Length of the serialized header in bytes.
    pub const fn len() -> usize {
        32 + 32 + 33 + 8 + 2 + 8
    }

    pub fn new(
        previous_hash: Hash,
        merkle_root: merkle::Root,
        address: Address,
        timestamp: u64,
        difficulty: Difficulty,
        nonce: u64,
    ) -> Header {
        Header {
            previous_hash,
            merkle_root,
            address,
            timestamp,
            difficulty,
            nonce,
            hash: Cached::new(),
        }
    }

    /// Get the hash of this header, computing and caching it if needed.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Clear the memoized hash after mutating a field (miners bump `nonce`).
    pub fn invalidate_hash(&mut self) {
        self.hash = Cached::new();
    }
}

impl DenaroDeserialize for Header {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut header = Header {
            previous_hash: Hash::denaro_deserialize(&mut reader)?,
            merkle_root: merkle::Root::denaro_deserialize(&mut reader)?,
            address: Address::denaro_deserialize(&mut reader)?,
            timestamp: u64::denaro_deserialize(&mut reader)?,
            difficulty: Difficulty::denaro_deserialize(&mut reader)?,
            nonce: u64::denaro_deserialize(&mut reader)?,
            hash: Cached::new(),
        };
        header.hash = Cached::from(Hash::from(&header));
        Ok(header)
    }
}
