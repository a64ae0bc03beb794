//! Core Denaro data structures and consensus-critical encodings.
//!
//! Everything that appears inside a block hash lives here: amounts,
//! addresses, keys, transactions, block headers, difficulties, and the
//! serialization rules that bind them. Contextual validation lives in
//! `denaro-consensus`; persistence in `denaro-state`.

#[macro_use]
extern crate serde;

pub mod address;
pub mod amount;
pub mod block;
pub mod cached;
pub mod fmt;
pub mod keys;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod varint;
pub mod work;

pub use serialization::{
    DenaroDeserialize, DenaroDeserializeInto, DenaroSerialize, SerializationError,
};
