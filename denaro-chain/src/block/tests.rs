use proptest::prelude::*;

use crate::serialization::{DenaroDeserialize, DenaroDeserializeInto, DenaroSerialize};

use super::*;

proptest! {
    #[test]
    fn block_hash_roundtrip(hash in any::<Hash>()) {
        denaro_test::init();

        let display = format!("{}", hash);
        let parsed = display.parse::<Hash>().expect("hash should parse");
        prop_assert_eq!(hash, parsed);
    }

    #[test]
    fn header_roundtrip(header in any::<Header>()) {
        denaro_test::init();

        let bytes = header.denaro_serialize_to_vec()?;
        prop_assert_eq!(bytes.len(), Header::len());

        let other: Header = bytes.as_slice().denaro_deserialize_into()?;
        prop_assert_eq!(header, other);
    }
}

proptest! {
    // Whole-block roundtrips serialize several transactions each, so run
    // fewer cases by default.
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn block_roundtrip(block in any::<Block>()) {
        denaro_test::init();

        let bytes = block.denaro_serialize_to_vec()?;
        let other: Block = bytes.as_slice().denaro_deserialize_into()?;
        prop_assert_eq!(block, other);
    }
}

#[test]
fn header_hash_commits_to_nonce() {
    denaro_test::init();

    let mut runner = proptest::test_runner::TestRunner::deterministic();
    let mut header = any::<Header>()
        .new_tree(&mut runner)
        .unwrap()
        .current();

    let before = header.hash();
    header.nonce = header.nonce.wrapping_add(1);
    header.invalidate_hash();
    assert_ne!(before, header.hash());
}

#[test]
fn deserialize_rejects_absurd_tx_count() {
    use crate::varint::VarInt;

    let mut runner = proptest::test_runner::TestRunner::deterministic();
    let header = any::<Header>().new_tree(&mut runner).unwrap().current();

    let mut bytes = header.denaro_serialize_to_vec().unwrap();
    VarInt::from(u32::MAX as usize)
        .denaro_serialize(&mut bytes)
        .unwrap();
    assert!(Block::denaro_deserialize(&bytes[..]).is_err());
}
