//! Consensus rules and the chain engine for Denaro.
//!
//! Stateless checks live in `block::check` and `transaction::check`; the
//! schedule arithmetic in `block::subsidy` and `difficulty`; the stateful
//! submit/reorg/mempool machinery in `chain`.

pub mod block;
pub mod chain;
pub mod difficulty;
pub mod error;
pub mod parameters;
pub mod transaction;

pub use chain::{BlockOutcome, ChainEngine, MiningInfo};
pub use error::{BlockError, TransactionError};
