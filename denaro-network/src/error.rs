use thiserror::Error;

use denaro_consensus::BlockError;
use denaro_state::StateError;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope header is malformed: {0}")]
    MalformedHeader(&'static str),

    #[error("envelope timestamp is outside the accepted skew")]
    SkewExceeded,

    #[error("public key does not hash to the claimed node id")]
    IdMismatch,

    #[error("envelope signature does not verify")]
    BadSignature,
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("peer request not authenticated: {0}")]
    Unauthenticated(#[from] EnvelopeError),

    #[error("peer is banned")]
    PeerBanned,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("a sync cycle is already in progress")]
    SyncInProgress,

    #[error("the sync cycle exceeded its deadline")]
    Timeout,

    #[error("http transport failure: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer returned {code}: {message}")]
    Remote { code: String, message: String },

    #[error("malformed peer payload: {0}")]
    MalformedPayload(&'static str),

    #[error("node identity could not be loaded: {0}")]
    Identity(&'static str),

    #[error(transparent)]
    Consensus(#[from] BlockError),

    #[error(transparent)]
    State(#[from] StateError),
}
