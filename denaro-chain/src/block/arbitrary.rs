//! Proptest strategies for blocks.

use std::sync::Arc;

use proptest::{collection::vec, prelude::*};

use crate::address::Address;
use crate::transaction::Transaction;
use crate::work::difficulty::Difficulty;

use super::{merkle, Block, Hash, Header};

impl Arbitrary for Header {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<Hash>(),
            any::<merkle::Root>(),
            any::<Address>(),
            any::<u64>(),
            any::<Difficulty>(),
            any::<u64>(),
        )
            .prop_map(
                |(previous_hash, merkle_root, address, timestamp, difficulty, nonce)| {
                    Header::new(
                        previous_hash,
                        merkle_root,
                        address,
                        timestamp,
                        difficulty,
                        nonce,
                    )
                },
            )
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Block {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<Header>(), vec(any::<Transaction>(), 0..4))
            .prop_map(|(mut header, transactions)| {
                let transactions: Vec<_> = transactions.into_iter().map(Arc::new).collect();
                header.merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
                Block {
                    header,
                    transactions,
                }
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
