use std::io;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use super::SerializationError;
use crate::varint::VarInt;

type Result<R> = std::result::Result<R, SerializationError>;

pub trait DenaroDeserialize {
    fn denaro_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait DenaroDeserializeInto {
    /// Deserialize based on type inference
    fn denaro_deserialize_into<T>(self) -> Result<T>
    where
        T: DenaroDeserialize;
}

impl<R: io::Read> DenaroDeserializeInto for R {
    fn denaro_deserialize_into<T>(self) -> Result<T>
    where
        T: DenaroDeserialize,
    {
        T::denaro_deserialize(self)
    }
}

impl DenaroDeserialize for bool {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("invalid bool")),
        }
    }
}

impl DenaroDeserialize for u8 {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl DenaroDeserialize for u16 {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl DenaroDeserialize for u32 {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl DenaroDeserialize for u64 {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl DenaroDeserialize for i64 {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl DenaroDeserialize for Vec<u8> {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<u8>> {
        let len = VarInt::denaro_deserialize(&mut reader)?.value() as usize;
        // Limit blind preallocation; oversized prefixes fail on read instead.
        let mut buf = Vec::new();
        reader.take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(SerializationError::Parse("byte string shorter than its prefix"));
        }
        Ok(buf)
    }
}

impl DenaroDeserialize for String {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let buf = Vec::<u8>::denaro_deserialize(&mut reader)?;
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl<T: DenaroDeserialize> DenaroDeserialize for Option<T> {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<Option<T>> {
        match bool::denaro_deserialize(&mut reader)? {
            true => Ok(Some(T::denaro_deserialize(&mut reader)?)),
            false => Ok(None),
        }
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl DenaroDeserialize for [u8; $size] {
            fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(32);
impl_deserializable_byte_array!(33);
impl_deserializable_byte_array!(64);
