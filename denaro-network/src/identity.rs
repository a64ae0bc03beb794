//! Stable cryptographic node identity.
//!
//! Each node holds a P-256 keypair generated on first start. The node id is
//! the SHA-256 of the compressed public key: 32 bytes, rendered as 64
//! lowercase hex characters everywhere it travels.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use denaro_chain::keys::{PublicKey, SecretKey, Signature};
use denaro_chain::serialization::sha256;

use crate::NetworkError;

/// A node id: SHA-256 of the node's compressed public key.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn of(key: &PublicKey) -> NodeId {
        NodeId(sha256::digest(&key.to_compressed_bytes()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<NodeId, NetworkError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| NetworkError::MalformedPayload("node id is not 64 hex characters"))?;
        Ok(NodeId(bytes))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeId").field(&self.to_hex()).finish()
    }
}

/// The node's keypair and derived id.
pub struct NodeIdentity {
    secret: SecretKey,
    public: PublicKey,
    node_id: NodeId,
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl NodeIdentity {
    fn from_secret(secret: SecretKey) -> NodeIdentity {
        let public = secret.public_key();
        let node_id = NodeId::of(&public);
        NodeIdentity {
            secret,
            public,
            node_id,
        }
    }

    /// Load the key from `path`, generating and persisting a fresh one on
    /// first start. Identity must be stable across restarts.
    pub fn load_or_generate(path: &Path) -> Result<NodeIdentity, NetworkError> {
        if path.exists() {
            let hex_key = fs::read_to_string(path)
                .map_err(|_| NetworkError::Identity("key file is unreadable"))?;
            let secret = SecretKey::from_hex(hex_key.trim())
                .map_err(|_| NetworkError::Identity("key file does not hold a valid key"))?;
            return Ok(NodeIdentity::from_secret(secret));
        }

        let secret = SecretKey::generate();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|_| NetworkError::Identity("key directory cannot be created"))?;
        }
        let mut file = fs::File::create(path)
            .map_err(|_| NetworkError::Identity("key file cannot be created"))?;
        file.write_all(hex::encode(secret.to_bytes()).as_bytes())
            .map_err(|_| NetworkError::Identity("key file cannot be written"))?;
        Ok(NodeIdentity::from_secret(secret))
    }

    /// An in-memory identity for tests.
    pub fn ephemeral() -> NodeIdentity {
        NodeIdentity::from_secret(SecretKey::generate())
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn pubkey_hex(&self) -> String {
        self.public.to_hex()
    }

    pub fn sign_digest(&self, digest: &[u8; 32]) -> Signature {
        self.secret.sign_digest(digest)
    }
}
