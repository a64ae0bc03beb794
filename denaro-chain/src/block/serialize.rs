//! The canonical block encoding and the size limits a decoder enforces.

use std::io::{self, Read};
use std::sync::Arc;

use crate::transaction::Transaction;
use crate::varint::VarInt;
use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

use super::{Block, Header};

/// Upper bound on a raw serialized block.
pub const MAX_BLOCK_BYTES: u64 = 2 * 1024 * 1024;

/// Upper bound on the hex rendering of a block.
pub const MAX_BLOCK_HEX: usize = 4 * 1024 * 1024;

/// Upper bound on the combined hex length of a block's transaction data,
/// which is what the mempool's block-template budget is measured against.
pub const MAX_TX_DATA_HEX: usize = 1_900_000;

/// Smallest possible transaction: a coinbase with one output and no message.
const MIN_TX_BYTES: u64 = 54;

impl DenaroSerialize for Block {
    fn denaro_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.denaro_serialize(&mut writer)?;
        VarInt::from(self.transactions.len()).denaro_serialize(&mut writer)?;
        for transaction in &self.transactions {
            transaction.denaro_serialize(&mut writer)?;
        }
        Ok(())
    }
}

impl DenaroDeserialize for Block {
    fn denaro_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        // Never read past the block size limit, whatever the prefixes claim.
        let mut reader = reader.take(MAX_BLOCK_BYTES);

        let header = Header::denaro_deserialize(&mut reader)?;

        let tx_count = VarInt::denaro_deserialize(&mut reader)?.value();
        // Sanity-bound the count before allocating.
        if tx_count > MAX_BLOCK_BYTES / MIN_TX_BYTES {
            return Err(SerializationError::Parse(
                "block claims more transactions than could fit",
            ));
        }
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            transactions.push(Arc::new(Transaction::denaro_deserialize(&mut reader)?));
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
