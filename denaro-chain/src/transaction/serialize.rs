//! The canonical transaction encoding.
//!
//! Field order: version, input count, inputs, output count, outputs, message
//! flag (+ prefixed bytes), fees. All lengths are bounded so a decoder never
//! trusts a length prefix further than the per-block limits allow.

use std::io;

use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

use super::{Input, Output, Transaction};
use crate::cached::Cached;

/// Upper bound on the optional message payload, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 512;

impl DenaroSerialize for Transaction {
    fn denaro_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.denaro_serialize(&mut writer)?;
        (self.inputs.len() as u8).denaro_serialize(&mut writer)?;
        for input in &self.inputs {
            input.denaro_serialize(&mut writer)?;
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

impl DenaroDeserialize for Transaction {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = u8::denaro_deserialize(&mut reader)?;

        let input_count = u8::denaro_deserialize(&mut reader)?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(Input::denaro_deserialize(&mut reader)?);
        }

        let output_count = u8::denaro_deserialize(&mut reader)?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            outputs.push(Output::denaro_deserialize(&mut reader)?);
        }

        let message = Option::<Vec<u8>>::denaro_deserialize(&mut reader)?;
        if let Some(bytes) = &message {
            if bytes.len() > MAX_MESSAGE_BYTES {
                return Err(SerializationError::Parse("message exceeds size bound"));
            }
        }

        let fees = crate::amount::Amount::denaro_deserialize(&mut reader)?;

        let mut transaction = Transaction {
            version,
            inputs,
            outputs,
            message,
            fees,
            hash: Cached::new(),
        };
        // Hashing re-serializes; cache the result while the bytes are warm.
        let hash = super::Hash::from(&transaction);
        transaction.hash = Cached::from(hash);
        Ok(transaction)
    }
}
