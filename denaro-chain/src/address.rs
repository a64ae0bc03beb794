//! Denaro addresses.
//!
//! An address names a P-256 public key directly. The display form is a parity
//! character (`D` for an even `y` coordinate, `E` for odd) followed by the
//! base58 encoding of the key's `x` coordinate and a one-byte checksum,
//! nominally 45 characters. The wire form is the 33-byte compressed SEC1
//! point, so converting an address back into a verifying key is lossless.

use std::convert::TryInto;
use std::{fmt, io};

use serde::Deserialize;

use crate::keys::PublicKey;
use crate::serialization::sha256;
use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

/// Nominal length of a rendered address.
pub const ADDRESS_LEN: usize = 45;

/// Parity of the public key's `y` coordinate, doubling as the address prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parity {
    /// SEC1 tag `0x02`, rendered as `D`.
    Even,
    /// SEC1 tag `0x03`, rendered as `E`.
    Odd,
}

impl Parity {
    fn sec1_tag(self) -> u8 {
        match self {
            Parity::Even => 0x02,
            Parity::Odd => 0x03,
        }
    }

    fn prefix_char(self) -> char {
        match self {
            Parity::Even => 'D',
            Parity::Odd => 'E',
        }
    }
}

/// A spendable destination: a compressed P-256 point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    parity: Parity,
    x: [u8; 32],
}

impl Address {
    /// The compressed SEC1 encoding of the underlying key.
    pub fn to_sec1_bytes(&self) -> [u8; 33] {
        let mut bytes = [0u8; 33];
        bytes[0] = self.parity.sec1_tag();
        bytes[1..].copy_from_slice(&self.x);
        bytes
    }

    pub fn from_sec1_bytes(bytes: &[u8; 33]) -> Result<Address, SerializationError> {
        let parity = match bytes[0] {
            0x02 => Parity::Even,
            0x03 => Parity::Odd,
            _ => return Err(SerializationError::Parse("invalid address tag byte")),
        };
        Ok(Address {
            parity,
            x: bytes[1..].try_into().expect("slice is 32 bytes"),
        })
    }

    /// Recover the verifying key this address names.
    ///
    /// Fails when the `x` coordinate is not on the curve, which can only
    /// happen for addresses deserialized from untrusted input.
    pub fn to_public_key(&self) -> Result<PublicKey, crate::keys::KeyError> {
        PublicKey::from_sec1_bytes(&self.to_sec1_bytes())
    }

    fn checksum(parity: Parity, x: &[u8; 32]) -> u8 {
        let mut preimage = [0u8; 33];
        preimage[0] = parity.prefix_char() as u8;
        preimage[1..].copy_from_slice(x);
        sha256::digest(&preimage)[0]
    }
}

impl From<&PublicKey> for Address {
    fn from(key: &PublicKey) -> Address {
        let sec1 = key.to_compressed_bytes();
        Address::from_sec1_bytes(&sec1).expect("compressed points have a valid tag")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = [0u8; 33];
        payload[..32].copy_from_slice(&self.x);
        payload[32] = Address::checksum(self.parity, &self.x);

        write!(
            f,
            "{}{}",
            self.parity.prefix_char(),
            bs58::encode(&payload[..]).into_string()
        )
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address")
            .field(&self.to_string())
            .finish()
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let parity = match chars.next() {
            Some('D') => Parity::Even,
            Some('E') => Parity::Odd,
            _ => return Err(SerializationError::Parse("address prefix must be D or E")),
        };
        let payload = bs58::decode(chars.as_str())
            .into_vec()
            .map_err(|_| SerializationError::Parse("address tail is not base58"))?;
        if payload.len() != 33 {
            return Err(SerializationError::Parse("address payload length"));
        }
        let x: [u8; 32] = payload[..32].try_into().expect("slice is 32 bytes");
        if payload[32] != Address::checksum(parity, &x) {
            return Err(SerializationError::Parse("address checksum mismatch"));
        }
        Ok(Address { parity, x })
    }
}

impl DenaroSerialize for Address {
    fn denaro_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.to_sec1_bytes().denaro_serialize(&mut writer)
    }
}

impl DenaroDeserialize for Address {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let bytes = <[u8; 33]>::denaro_deserialize(&mut reader)?;
        Address::from_sec1_bytes(&bytes)
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl proptest::arbitrary::Arbitrary for Address {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        (any::<bool>(), any::<[u8; 32]>())
            .prop_map(|(odd, x)| Address {
                parity: if odd { Parity::Odd } else { Parity::Even },
                x,
            })
            .boxed()
    }

    type Strategy = proptest::strategy::BoxedStrategy<Self>;
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::keys::SecretKey;

    #[test]
    fn display_fromstr_roundtrip() {
        for _ in 0..8 {
            let address = Address::from(&SecretKey::generate().public_key());
            let rendered = address.to_string();
            assert!(rendered.starts_with('D') || rendered.starts_with('E'));
            assert_eq!(Address::from_str(&rendered).unwrap(), address);
        }
    }

    #[test]
    fn corrupt_checksum_rejected() {
        let address = Address::from(&SecretKey::generate().public_key());
        let mut rendered = address.to_string();
        // Swap the last character for a different base58 character.
        let last = rendered.pop().unwrap();
        rendered.push(if last == '2' { '3' } else { '2' });
        assert!(Address::from_str(&rendered).is_err());
    }

    #[test]
    fn recovered_key_matches() {
        let key = SecretKey::generate().public_key();
        let address = Address::from(&key);
        assert_eq!(address.to_public_key().unwrap(), key);
    }

    #[test]
    fn wire_roundtrip() {
        let address = Address::from(&SecretKey::generate().public_key());
        let bytes = address.denaro_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), 33);
        assert_eq!(Address::denaro_deserialize(&bytes[..]).unwrap(), address);
    }
}
