//! Minimal variable-length integers for length prefixes.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

/// A length prefix with a single valid encoding per value.
///
/// Values below 253 are one byte; larger values use a marker byte (253/254/255)
/// followed by a little-endian u16/u32/u64. Decoding rejects non-minimal
/// encodings, so a `VarInt` can appear in hashed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(u64);

impl VarInt {
    pub fn from(value: usize) -> VarInt {
        VarInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Encoded size in bytes for a prefix covering `value` items.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= u16::MAX as usize {
            3
        } else if value <= u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl DenaroSerialize for VarInt {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.0 < 253 {
            target.write_all(&[self.0 as u8])
        } else if self.0 <= u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.0 as u16)
        } else if self.0 <= u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.0 as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.0)
        }
    }
}

impl DenaroDeserialize for VarInt {
    fn denaro_deserialize<R: std::io::Read>(mut reader: R) -> Result<VarInt, SerializationError> {
        let first = u8::denaro_deserialize(&mut reader)?;
        let value = match first {
            0..=252 => return Ok(VarInt(first as u64)),
            253 => u16::denaro_deserialize(&mut reader)? as u64,
            254 => u32::denaro_deserialize(&mut reader)? as u64,
            255 => u64::denaro_deserialize(&mut reader)?,
        };
        let minimal = match first {
            253 => value >= 253,
            254 => value > u16::MAX as u64,
            _ => value > u32::MAX as u64,
        };
        if !minimal {
            return Err(SerializationError::Parse("non-minimal var-int"));
        }
        Ok(VarInt(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_encodings() {
        for value in [0usize, 1, 252, 253, 65535, 65536, u32::MAX as usize] {
            let bytes = VarInt::from(value).denaro_serialize_to_vec().unwrap();
            assert_eq!(bytes.len(), VarInt::size(value));
            let decoded = VarInt::denaro_deserialize(&bytes[..]).unwrap();
            assert_eq!(decoded.value(), value as u64);
        }
    }

    #[test]
    fn rejects_non_minimal() {
        // 5 encoded with the u16 marker
        let bytes = [253u8, 5, 0];
        assert!(VarInt::denaro_deserialize(&bytes[..]).is_err());
        // 300 encoded with the u32 marker
        let bytes = [254u8, 44, 1, 0, 0];
        assert!(VarInt::denaro_deserialize(&bytes[..]).is_err());
    }
}
