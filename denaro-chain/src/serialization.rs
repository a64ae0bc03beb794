//! Consensus-critical serialization.
//!
//! This module defines `DenaroSerialize` and `DenaroDeserialize`, analogs of
//! the Serde `Serialize` and `Deserialize` traits but intended for the
//! canonical Denaro wire format: integers are little-endian, variable-length
//! data carries a minimal var-int length prefix, and every value has exactly
//! one encoding. Types that appear in block or transaction encodings must
//! round-trip bit-for-bit, because hashes are computed over these bytes.

mod deserialize;
mod error;

pub mod sha256;

pub use deserialize::{DenaroDeserialize, DenaroDeserializeInto};
pub use error::SerializationError;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::varint::VarInt;

pub trait DenaroSerialize {
    fn denaro_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn denaro_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.denaro_serialize(&mut data)?;
        Ok(data)
    }
}

impl DenaroSerialize for bool {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl DenaroSerialize for u8 {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self])
    }
}

impl DenaroSerialize for u16 {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl DenaroSerialize for u32 {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl DenaroSerialize for u64 {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl DenaroSerialize for i64 {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl DenaroSerialize for [u8; 32] {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl DenaroSerialize for [u8; 33] {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl DenaroSerialize for [u8; 64] {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

/// Byte strings carry a minimal var-int length prefix.
impl DenaroSerialize for Vec<u8> {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        VarInt::from(self.len()).denaro_serialize(&mut target)?;
        target.write_all(self)
    }
}

impl DenaroSerialize for String {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        VarInt::from(self.len()).denaro_serialize(&mut target)?;
        target.write_all(self.as_bytes())
    }
}

/// `None` encodes as a zero flag byte, `Some` as a one flag byte followed by
/// the contents. The flag byte must be exactly 0 or 1 on the way back in.
impl<T: DenaroSerialize> DenaroSerialize for Option<T> {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            Some(contents) => {
                target.write_all(&[1])?;
                contents.denaro_serialize(&mut target)
            }
            None => target.write_all(&[0]),
        }
    }
}
