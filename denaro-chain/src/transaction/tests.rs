use proptest::prelude::*;

use crate::address::Address;
use crate::amount::Amount;
use crate::keys::SecretKey;
use crate::serialization::{DenaroDeserializeInto, DenaroSerialize};

use super::*;

proptest! {
    #[test]
    fn transaction_roundtrip(transaction in any::<Transaction>()) {
        denaro_test::init();

        let bytes = transaction.denaro_serialize_to_vec()?;
        prop_assert_eq!(bytes.len(), transaction.len());

        let other: Transaction = bytes.as_slice().denaro_deserialize_into()?;
        prop_assert_eq!(transaction, other);
    }

    #[test]
    fn hash_roundtrip(hash in any::<Hash>()) {
        denaro_test::init();

        let display = format!("{}", hash);
        let parsed = display.parse::<Hash>().expect("hash should parse");
        prop_assert_eq!(hash, parsed);
    }
}

#[test]
fn signing_digest_excludes_signatures() {
    denaro_test::init();

    let key = SecretKey::generate();
    let address = Address::from(&key.public_key());
    let outpoint = OutPoint {
        hash: Hash([7; 32]),
        index: 0,
    };
    let mut transaction = Transaction::new(
        CURRENT_VERSION,
        vec![Input::unsigned(outpoint)],
        vec![Output {
            address,
            amount: Amount::from_coins(1).unwrap(),
        }],
        None,
        Amount::ZERO,
    );

    let before = transaction.signing_digest();
    transaction.sign(&[&key]);
    assert_eq!(before, transaction.signing_digest());

    // The canonical hash, on the other hand, must commit to the signature.
    let mut resigned = transaction.clone();
    resigned.inputs[0].signature = crate::keys::Signature([9; 64]);
    assert_ne!(transaction.hash(), resigned.hash());
}

#[test]
fn coinbase_has_no_inputs() {
    let address = Address::from(&SecretKey::generate().public_key());
    let coinbase = Transaction::coinbase(address, Amount::from_coins(64).unwrap());
    assert!(coinbase.is_coinbase());
    assert_eq!(coinbase.outputs.len(), 1);
    assert!(coinbase.fees.is_zero());
}

#[test]
fn oversized_message_rejected() {
    let address = Address::from(&SecretKey::generate().public_key());
    let mut transaction = Transaction::coinbase(address, Amount::from_coins(1).unwrap());
    transaction.message = Some(vec![0u8; MAX_MESSAGE_BYTES + 1]);

    let bytes = transaction.denaro_serialize_to_vec().unwrap();
    assert!(Transaction::denaro_deserialize(&bytes[..]).is_err());
}
