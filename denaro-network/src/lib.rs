//! Peer-to-peer networking for Denaro nodes.
//!
//! Covers node identity, the signed-request envelope, the peer registry with
//! reputation and rate limits, the outbound peer client, and the
//! synchroniser that keeps the local chain converged with the network. The
//! HTTP framing layer mounts these pieces; nothing here binds a socket.

#[macro_use]
extern crate serde;

pub mod client;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod peer;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod sync;

pub use client::PeerClient;
pub use envelope::SignedEnvelope;
pub use error::{EnvelopeError, NetworkError};
pub use identity::{NodeId, NodeIdentity};
pub use peer::{PeerRecord, ReputationEvent};
pub use rate_limit::RateLimiter;
pub use registry::PeerRegistry;
pub use sync::Synchroniser;
