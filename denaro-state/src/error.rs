use thiserror::Error;

use denaro_chain::block;
use denaro_chain::transaction::OutPoint;
use denaro_chain::SerializationError;

/// Errors from the persistent ledger state.
#[derive(Error, Debug)]
pub enum StateError {
    /// The storage engine failed; retryable at the caller's discretion.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sled::Error),

    /// A stored row failed to decode; the database is damaged.
    #[error("corrupt database: {0}")]
    Corrupt(&'static str),

    #[error("codec failure: {0}")]
    Serialization(#[from] SerializationError),

    /// The referenced output does not exist or was already consumed.
    #[error("output {0:?} is missing or already spent")]
    MissingUtxo(OutPoint),

    /// A block with this hash is already committed.
    #[error("block {0} is already committed")]
    DuplicateBlock(block::Hash),

    /// A pending transaction already reserves the referenced output.
    #[error("output {0:?} is reserved by a pending transaction")]
    ReservationConflict(OutPoint),

    /// The pending pool is at capacity and the newcomer does not outbid the
    /// cheapest resident.
    #[error("pending transaction pool is full")]
    MempoolFull,

    /// Attempted to undo past the genesis block.
    #[error("cannot undo an empty chain")]
    EmptyChain,
}

impl From<denaro_chain::amount::AmountError> for StateError {
    fn from(_: denaro_chain::amount::AmountError) -> Self {
        StateError::Corrupt("amount arithmetic overflowed on stored values")
    }
}
