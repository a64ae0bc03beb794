//! JSON message types shared with the HTTP framing layer and remote peers.
//!
//! Blocks and transactions travel as hex strings of their canonical
//! encoding; JSON only frames them.

use std::sync::Arc;

use denaro_chain::block::{Block, MAX_BLOCK_HEX};
use denaro_chain::transaction::Transaction;
use denaro_chain::{DenaroDeserialize, DenaroSerialize};
use denaro_consensus::{BlockError, TransactionError};

use crate::NetworkError;

/// The uniform response envelope: `{ ok, result?, error? }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> ApiResponse<T> {
        ApiResponse {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(code: &str, message: impl Into<String>) -> ApiResponse<T> {
        ApiResponse {
            ok: false,
            result: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    /// Collapse a remote response into a result.
    pub fn into_result(self) -> Result<T, NetworkError> {
        match (self.ok, self.result, self.error) {
            (true, Some(result), _) => Ok(result),
            (_, _, Some(error)) => Err(NetworkError::Remote {
                code: error.code,
                message: error.message,
            }),
            _ => Err(NetworkError::MalformedPayload("response held no result")),
        }
    }
}

/// `GET /`: the service banner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RootInfo {
    pub node_version: String,
    pub github_repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_docs: Option<String>,
}

/// `GET /handshake/challenge`: a fresh nonce a peer may sign to prove key
/// possession out-of-band.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// `GET /get_status` and the handshake payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub is_public: bool,
    pub node_version: String,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_hash: Option<String>,
    pub uptime_seconds: u64,
}

/// One probe entry of a chain locator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocatorEntry {
    pub height: u32,
    pub hash: String,
}

/// `POST /sync_blockchain`: the caller's locator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRequest {
    pub locator: Vec<LocatorEntry>,
}

/// The highest locator entry the remote recognises.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_height: Option<u32>,
}

/// `GET /get_blocks?offset&limit`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BlocksResponse {
    pub blocks: Vec<String>,
}

/// Signed `POST /push_block`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushBlockRequest {
    pub block: String,
}

/// Signed `POST /push_blocks`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushBlocksRequest {
    pub blocks: Vec<String>,
}

/// `POST /submit_block` outcome, also returned to pushing peers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitBlockResponse {
    pub outcome: String,
    pub height: u32,
}

pub fn block_to_hex(block: &Block) -> String {
    hex::encode(
        block
            .denaro_serialize_to_vec()
            .expect("writing to a vec never fails"),
    )
}

pub fn block_from_hex(raw: &str) -> Result<Arc<Block>, NetworkError> {
    if raw.len() > MAX_BLOCK_HEX {
        return Err(NetworkError::MalformedPayload("block hex exceeds size bound"));
    }
    let bytes =
        hex::decode(raw).map_err(|_| NetworkError::MalformedPayload("block is not valid hex"))?;
    Block::denaro_deserialize(&bytes[..])
        .map(Arc::new)
        .map_err(|_| NetworkError::MalformedPayload("block failed to decode"))
}

pub fn transaction_to_hex(tx: &Transaction) -> String {
    hex::encode(
        tx.denaro_serialize_to_vec()
            .expect("writing to a vec never fails"),
    )
}

pub fn transaction_from_hex(raw: &str) -> Result<Arc<Transaction>, NetworkError> {
    let bytes = hex::decode(raw)
        .map_err(|_| NetworkError::MalformedPayload("transaction is not valid hex"))?;
    Transaction::denaro_deserialize(&bytes[..])
        .map(Arc::new)
        .map_err(|_| NetworkError::MalformedPayload("transaction failed to decode"))
}

/// The stable error code for a rejected block, as surfaced to callers.
pub fn block_error_code(error: &BlockError) -> &'static str {
    match error {
        BlockError::Orphan(_) => "OrphanBlock",
        BlockError::TimeRegression { .. } | BlockError::TimeTooFarAhead { .. } => "InvalidStructure",
        BlockError::BadDifficulty { .. } => "BadDifficulty",
        BlockError::BadReward => "BadReward",
        BlockError::PoWInvalid(_) => "PoWInvalid",
        BlockError::TooLarge(_) => "BlockTooLarge",
        BlockError::NoTransactions
        | BlockError::CoinbasePosition
        | BlockError::BadMerkleRoot
        | BlockError::DuplicateTransaction
        | BlockError::NonContiguous(_)
        | BlockError::TooManyBlocks
        | BlockError::ReorgTooDeep(_) => "InvalidStructure",
        BlockError::Transaction(error) => transaction_error_code(error),
        BlockError::State(_) => "StorageUnavailable",
    }
}

pub fn transaction_error_code(error: &TransactionError) -> &'static str {
    match error {
        TransactionError::InvalidStructure(_) => "InvalidStructure",
        TransactionError::UnknownInput(_) => "UnknownInput",
        TransactionError::DoubleSpend(_) => "DoubleSpend",
        TransactionError::BadSignature(_) => "BadSignature",
        TransactionError::InsufficientFunds { .. } => "InsufficientFunds",
        TransactionError::AmountOutOfRange => "AmountOutOfRange",
        TransactionError::CoinbaseValueMismatch { .. } => "BadReward",
        TransactionError::MempoolFull => "MempoolFull",
    }
}
