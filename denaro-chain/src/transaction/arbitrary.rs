//! Proptest strategies for transactions.
//!
//! Generated transactions are structurally plausible (bounded counts, bounded
//! message) but carry random signatures; they exercise the codec, not the
//! validator.

use proptest::{collection::vec, option, prelude::*};

use crate::address::Address;
use crate::amount::Amount;
use crate::cached::Cached;
use crate::keys::Signature;

use super::{Input, Output, OutPoint, Transaction, MAX_MESSAGE_BYTES};

impl Arbitrary for Input {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<OutPoint>(), any::<[u8; 64]>())
            .prop_map(|(outpoint, sig)| Input {
                outpoint,
                signature: Signature(sig),
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for OutPoint {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<super::Hash>(), any::<u8>())
            .prop_map(|(hash, index)| OutPoint { hash, index })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Output {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<Address>(), any::<Amount>())
            .prop_map(|(address, amount)| Output { address, amount })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Transaction {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<u8>(),
            vec(any::<Input>(), 0..4),
            vec(any::<Output>(), 1..4),
            option::of(vec(any::<u8>(), 0..=MAX_MESSAGE_BYTES)),
            any::<Amount>(),
        )
            .prop_map(|(version, inputs, outputs, message, fees)| Transaction {
                version,
                inputs,
                outputs,
                message,
                fees,
                hash: Cached::new(),
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
