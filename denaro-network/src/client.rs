//! The outbound HTTP client for peer calls.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::constants::{CONNECTION_TIMEOUT, SYNC_BATCH_BLOCKS};
use crate::envelope::SignedEnvelope;
use crate::identity::NodeIdentity;
use crate::protocol::{
    ApiResponse, BlocksResponse, PushBlockRequest, PushBlocksRequest, StatusResponse, SyncRequest,
    SyncResponse,
};
use crate::NetworkError;

/// A JSON client for remote node endpoints, signing where the protocol
/// demands it. Every request carries the connection timeout.
pub struct PeerClient {
    http: reqwest::Client,
    identity: Arc<NodeIdentity>,
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient").finish()
    }
}

impl PeerClient {
    pub fn new(identity: Arc<NodeIdentity>) -> Result<PeerClient, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(CONNECTION_TIMEOUT)
            .build()?;
        Ok(PeerClient { http, identity })
    }

    /// `GET {base}/get_status`, the first half of a handshake.
    pub async fn get_status(&self, base_url: &str) -> Result<StatusResponse, NetworkError> {
        let url = join(base_url, "/get_status");
        let response: ApiResponse<StatusResponse> =
            self.http.get(url).send().await?.json().await?;
        response.into_result()
    }

    /// `POST {base}/sync_blockchain` with our locator; the remote answers
    /// with the highest entry it recognises.
    pub async fn sync_blockchain(
        &self,
        base_url: &str,
        request: &SyncRequest,
    ) -> Result<SyncResponse, NetworkError> {
        let url = join(base_url, "/sync_blockchain");
        let response: ApiResponse<SyncResponse> = self
            .http
            .post(url)
            .json(request)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }

    /// `GET {base}/get_blocks?offset&limit`, one pull-sync batch.
    pub async fn get_blocks(
        &self,
        base_url: &str,
        offset: u32,
        limit: u32,
    ) -> Result<BlocksResponse, NetworkError> {
        let url = join(base_url, "/get_blocks");
        let response: ApiResponse<BlocksResponse> = self
            .http
            .get(url)
            .query(&[("offset", offset), ("limit", limit.min(SYNC_BATCH_BLOCKS))])
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }

    /// Signed `POST {base}/push_block`.
    pub async fn push_block(
        &self,
        base_url: &str,
        block_hex: String,
    ) -> Result<(), NetworkError> {
        let body = serde_json::to_vec(&PushBlockRequest { block: block_hex })
            .expect("request types encode");
        self.signed_post(base_url, "/push_block", body).await
    }

    /// Signed `POST {base}/push_tx`.
    pub async fn push_tx(&self, base_url: &str, tx_hex: String) -> Result<(), NetworkError> {
        let body = serde_json::to_vec(&serde_json::json!({ "tx": tx_hex }))
            .expect("request types encode");
        self.signed_post(base_url, "/push_tx", body).await
    }

    /// Signed `POST {base}/push_blocks`.
    pub async fn push_blocks(
        &self,
        base_url: &str,
        blocks_hex: Vec<String>,
    ) -> Result<(), NetworkError> {
        let body = serde_json::to_vec(&PushBlocksRequest { blocks: blocks_hex })
            .expect("request types encode");
        self.signed_post(base_url, "/push_blocks", body).await
    }

    async fn signed_post(
        &self,
        base_url: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<(), NetworkError> {
        let envelope = SignedEnvelope::sign(&self.identity, "POST", path, &body, Utc::now());

        let mut request = self
            .http
            .post(join(base_url, path))
            .header("content-type", "application/json");
        for (name, value) in envelope.headers() {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        let response: ApiResponse<serde_json::Value> = response.json().await?;
        debug!(%status, peer = base_url, path, "signed peer call settled");
        response.into_result().map(|_| ())
    }
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_normalizes_trailing_slash() {
        assert_eq!(
            join("http://peer.example:3006/", "/get_status"),
            "http://peer.example:3006/get_status"
        );
        assert_eq!(
            join("http://peer.example:3006", "/get_status"),
            "http://peer.example:3006/get_status"
        );
    }
}
