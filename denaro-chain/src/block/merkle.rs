//! The transaction commitment in a block header.

use std::io;
use std::iter::FromIterator;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::serialization::{sha256, DenaroDeserialize, DenaroSerialize, SerializationError};
use crate::transaction;

/// The root of a block's transaction commitment: SHA-256 over the
/// concatenated transaction hashes, in block order.
///
/// Unlike a full Merkle tree this binds the exact ordered list in one pass;
/// there is no inclusion-proof use case here, only header binding, and the
/// flat construction has no duplicate-leaf malleability.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Root(pub [u8; 32]);

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut writer = sha256::Writer::default();
        for hash in hashes {
            hash.denaro_serialize(&mut writer)
                .expect("hash writers don't error");
        }
        Root(writer.finish())
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl DenaroSerialize for Root {
    fn denaro_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.denaro_serialize(&mut writer)
    }
}

impl DenaroDeserialize for Root {
    fn denaro_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::denaro_deserialize(&mut reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matters() {
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);

        let forward: Root = vec![a, b].into_iter().collect();
        let reverse: Root = vec![b, a].into_iter().collect();
        assert_ne!(forward, reverse);
    }

    #[test]
    fn empty_root_is_hash_of_nothing() {
        let empty: Root = std::iter::empty::<transaction::Hash>().collect();
        assert_eq!(empty.0, sha256::digest(b""));
    }
}
