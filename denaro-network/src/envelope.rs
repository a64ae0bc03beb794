//! The signed-request envelope for authenticated peer calls.
//!
//! The signature commits to the request method, path, a timestamp, and the
//! SHA-256 of the body, joined by newlines. A request is accepted only when
//! the signature verifies against a public key whose hash matches the
//! claimed node id and the timestamp is within the skew bound.

use chrono::{DateTime, Utc};

use denaro_chain::keys::{PublicKey, Signature};
use denaro_chain::serialization::sha256;

use crate::constants::{ENVELOPE_MAX_SKEW_SECS, NODE_VERSION};
use crate::error::EnvelopeError;
use crate::identity::{NodeId, NodeIdentity};

pub const HEADER_NODE_ID: &str = "x-node-id";
pub const HEADER_NODE_PUBKEY: &str = "x-node-pubkey";
pub const HEADER_NODE_VERSION: &str = "x-node-version";
pub const HEADER_TIMESTAMP: &str = "x-timestamp";
pub const HEADER_SIGNATURE: &str = "x-signature";

/// The authentication headers of one signed peer request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub node_id: String,
    pub pubkey: String,
    pub node_version: String,
    pub timestamp: i64,
    pub signature: String,
}

/// The digest the envelope signature commits to.
fn signing_digest(method: &str, path: &str, timestamp: i64, body: &[u8]) -> [u8; 32] {
    let body_hash = hex::encode(sha256::digest(body));
    let preimage = format!(
        "{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path,
        timestamp,
        body_hash
    );
    sha256::digest(preimage.as_bytes())
}

impl SignedEnvelope {
    /// Sign a request about to be sent.
    pub fn sign(
        identity: &NodeIdentity,
        method: &str,
        path: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> SignedEnvelope {
        let timestamp = now.timestamp();
        let signature = identity.sign_digest(&signing_digest(method, path, timestamp, body));
        SignedEnvelope {
            node_id: identity.node_id().to_hex(),
            pubkey: identity.pubkey_hex(),
            node_version: NODE_VERSION.to_string(),
            timestamp,
            signature: signature.to_hex(),
        }
    }

    /// The headers to attach to the outbound request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_NODE_ID, self.node_id.clone()),
            (HEADER_NODE_PUBKEY, self.pubkey.clone()),
            (HEADER_NODE_VERSION, self.node_version.clone()),
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_SIGNATURE, self.signature.clone()),
        ]
    }

    /// Rebuild an envelope from received header values.
    pub fn from_headers(
        node_id: Option<&str>,
        pubkey: Option<&str>,
        node_version: Option<&str>,
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<SignedEnvelope, EnvelopeError> {
        let missing = EnvelopeError::MalformedHeader("a required header is missing");
        Ok(SignedEnvelope {
            node_id: node_id.ok_or_else(|| missing.clone())?.to_string(),
            pubkey: pubkey.ok_or_else(|| missing.clone())?.to_string(),
            node_version: node_version.ok_or_else(|| missing.clone())?.to_string(),
            timestamp: timestamp
                .ok_or_else(|| missing.clone())?
                .parse()
                .map_err(|_| EnvelopeError::MalformedHeader("timestamp is not an integer"))?,
            signature: signature.ok_or(missing)?.to_string(),
        })
    }

    /// Verify an inbound request, returning the authenticated peer id.
    pub fn verify(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<NodeId, EnvelopeError> {
        if (now.timestamp() - self.timestamp).abs() > ENVELOPE_MAX_SKEW_SECS {
            return Err(EnvelopeError::SkewExceeded);
        }

        let key = PublicKey::from_hex(&self.pubkey)
            .map_err(|_| EnvelopeError::MalformedHeader("public key is not a P-256 point"))?;

        let claimed = parse_node_id(&self.node_id)?;
        if NodeId::of(&key) != claimed {
            return Err(EnvelopeError::IdMismatch);
        }

        let signature = Signature::from_hex(&self.signature)
            .map_err(|_| EnvelopeError::MalformedHeader("signature is not 64 hex bytes"))?;
        key.verify_digest(
            &signing_digest(method, path, self.timestamp, body),
            &signature,
            true,
        )
        .map_err(|_| EnvelopeError::BadSignature)?;

        Ok(claimed)
    }
}

fn parse_node_id(raw: &str) -> Result<NodeId, EnvelopeError> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(raw, &mut bytes)
        .map_err(|_| EnvelopeError::MalformedHeader("node id is not 64 hex characters"))?;
    Ok(NodeId(bytes))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn signed(identity: &NodeIdentity, now: DateTime<Utc>) -> SignedEnvelope {
        SignedEnvelope::sign(identity, "post", "/push_block", b"{\"block\":\"00\"}", now)
    }

    #[test]
    fn roundtrip_accepts() {
        denaro_test::init();

        let identity = NodeIdentity::ephemeral();
        let now = Utc::now();
        let envelope = signed(&identity, now);

        let peer = envelope
            .verify("POST", "/push_block", b"{\"block\":\"00\"}", now)
            .expect("fresh envelope verifies");
        assert_eq!(peer, identity.node_id());
    }

    #[test]
    fn skew_beyond_thirty_seconds_rejects() {
        let identity = NodeIdentity::ephemeral();
        let now = Utc::now();
        let envelope = signed(&identity, now);

        let late = now + Duration::seconds(ENVELOPE_MAX_SKEW_SECS + 1);
        assert_eq!(
            envelope.verify("POST", "/push_block", b"{\"block\":\"00\"}", late),
            Err(EnvelopeError::SkewExceeded)
        );

        let early = now - Duration::seconds(ENVELOPE_MAX_SKEW_SECS + 1);
        assert_eq!(
            envelope.verify("POST", "/push_block", b"{\"block\":\"00\"}", early),
            Err(EnvelopeError::SkewExceeded)
        );

        // The boundary itself is inclusive.
        let edge = now + Duration::seconds(ENVELOPE_MAX_SKEW_SECS);
        assert!(envelope
            .verify("POST", "/push_block", b"{\"block\":\"00\"}", edge)
            .is_ok());
    }

    #[test]
    fn tampered_body_or_path_rejects() {
        let identity = NodeIdentity::ephemeral();
        let now = Utc::now();
        let envelope = signed(&identity, now);

        assert_eq!(
            envelope.verify("POST", "/push_block", b"{\"block\":\"ff\"}", now),
            Err(EnvelopeError::BadSignature)
        );
        assert_eq!(
            envelope.verify("POST", "/push_blocks", b"{\"block\":\"00\"}", now),
            Err(EnvelopeError::BadSignature)
        );
    }

    #[test]
    fn borrowed_node_id_rejects() {
        let identity = NodeIdentity::ephemeral();
        let other = NodeIdentity::ephemeral();
        let now = Utc::now();

        let mut envelope = signed(&identity, now);
        envelope.node_id = other.node_id().to_hex();
        assert_eq!(
            envelope.verify("POST", "/push_block", b"{\"block\":\"00\"}", now),
            Err(EnvelopeError::IdMismatch)
        );
    }
}
