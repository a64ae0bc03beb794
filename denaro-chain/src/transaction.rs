//! Transactions and transaction-related structures.

use std::io;

use denaro_serde_derive::{DenaroDeserialize, DenaroSerialize};

use crate::address::Address;
use crate::amount::Amount;
use crate::cached::Cached;
use crate::keys::{SecretKey, Signature};
use crate::varint::VarInt;
use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

mod hash;
mod serialize;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

pub use hash::Hash;
pub use serialize::MAX_MESSAGE_BYTES;

/// Input and output counts are single bytes on the wire.
pub const MAX_INPUTS: usize = 255;
pub const MAX_OUTPUTS: usize = 255;

/// The transaction version currently produced by this node.
pub const CURRENT_VERSION: u8 = 1;

/// A reference to one output of a previous transaction.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    DenaroSerialize, DenaroDeserialize,
)]
pub struct OutPoint {
    /// The transaction that produced the referenced output.
    pub hash: self::Hash,
    /// Position of the output within that transaction.
    pub index: u8,
}

impl OutPoint {
    /// Serialized length in bytes.
    pub const fn len() -> usize {
        33
    }
}

/// A transaction input: an output reference plus the signature
/// authorizing its spend.
#[derive(Clone, Debug, Eq, PartialEq, DenaroSerialize, DenaroDeserialize)]
pub struct Input {
    pub outpoint: OutPoint,
    pub signature: Signature,
}

impl Input {
    /// An input with a placeholder signature, for transactions being built.
    pub fn unsigned(outpoint: OutPoint) -> Input {
        Input {
            outpoint,
            signature: Signature::placeholder(),
        }
    }

    pub const fn len() -> usize {
        OutPoint::len() + 64
    }
}

/// A transaction output: a destination address and an amount.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, DenaroSerialize, DenaroDeserialize,
)]
pub struct Output {
    pub address: Address,
    pub amount: Amount,
}

impl Output {
    pub const fn len() -> usize {
        33 + 8
    }
}

/// A Denaro transaction.
///
/// A *coinbase* transaction has no inputs; it mints the block reward plus the
/// fees of the other transactions in its block. Everything else consumes
/// previously unspent outputs and declares the fee it pays explicitly, so the
/// conservation rule `Σinputs − Σoutputs = fees` is checkable without context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    /// The transaction format version.
    pub version: u8,
    /// Consumed outputs, each with its authorizing signature.
    pub inputs: Vec<Input>,
    /// Newly created outputs.
    pub outputs: Vec<Output>,
    /// Optional free-form payload, bounded by [`MAX_MESSAGE_BYTES`].
    pub message: Option<Vec<u8>>,
    /// The declared fee, paid to the miner.
    pub fees: Amount,
    hash: Cached<self::Hash>,
}

impl Transaction {
    pub fn new(
        version: u8,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        message: Option<Vec<u8>>,
        fees: Amount,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            message,
            fees,
            hash: Cached::new(),
        }
    }

    /// The coinbase transaction for a block paying `amount` to `address`.
    pub fn coinbase(address: Address, amount: Amount) -> Transaction {
        Transaction::new(
            CURRENT_VERSION,
            Vec::new(),
            vec![Output { address, amount }],
            None,
            Amount::ZERO,
        )
    }

    /// Returns `true` if this transaction mints coins instead of moving them.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Get the canonical hash of this transaction.
    pub fn hash(&self) -> self::Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        self::Hash::from(self)
    }

    /// Sign every input with the matching key, in input order.
    ///
    /// The keys must correspond to the addresses of the referenced outputs or
    /// validation will reject the result.
    pub fn sign(&mut self, keys: &[&SecretKey]) {
        let digest = self.signing_digest();
        for (input, key) in self.inputs.iter_mut().zip(keys) {
            input.signature = key.sign_digest(&digest);
        }
        self.hash = Cached::new();
    }

    /// The digest that input signatures commit to.
    ///
    /// Computed over the canonical encoding with every signature omitted, so
    /// signing one input cannot invalidate another.
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut writer = crate::serialization::sha256::Writer::default();
        self.write_signing_preimage(&mut writer)
            .expect("hash writers don't error");
        writer.finish()
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        let message_len = match &self.message {
            Some(bytes) => VarInt::size(bytes.len()) + bytes.len(),
            None => 0,
        };
        // version + counts + flag + fees
        1 + 1
            + self.inputs.len() * Input::len()
            + 1
            + self.outputs.len() * Output::len()
            + 1
            + message_len
            + 8
    }

    /// Length of the hex rendering used for block size accounting.
    pub fn hex_len(&self) -> usize {
        2 * self.len()
    }

    fn write_signing_preimage<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.denaro_serialize(&mut writer)?;
        (self.inputs.len() as u8).denaro_serialize(&mut writer)?;
        for input in &self.inputs {
            input.outpoint.denaro_serialize(&mut writer)?;
        }
        (self.outputs.len() as u8).denaro_serialize(&mut writer)?;
        for output in &self.outputs {
            output.denaro_serialize(&mut writer)?;
        }
        self.message.denaro_serialize(&mut writer)?;
        self.fees.denaro_serialize(&mut writer)?;
        Ok(())
    }
}
