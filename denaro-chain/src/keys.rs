//! ECDSA keys and signatures over NIST P-256.
//!
//! Signatures are 64 raw bytes (`r ‖ s`), always produced in low-`s` form.
//! Whether a high-`s` signature is *accepted* depends on the consensus
//! version, so verification takes an explicit strictness flag.

use std::convert::TryInto;
use std::fmt;

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::elliptic_curve::scalar::IsHigh;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use thiserror::Error;

use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum KeyError {
    /// Input was not valid hex, had the wrong length, or is not on the curve.
    #[error("malformed key material: {0}")]
    MalformedInput(&'static str),
    /// The signature did not verify against the given key and digest.
    #[error("signature verification failed")]
    SignatureInvalid,
}

/// A P-256 signing key.
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Generate a fresh key from the system RNG.
    pub fn generate() -> SecretKey {
        SecretKey(SigningKey::random(&mut rand_core::OsRng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SecretKey, KeyError> {
        SigningKey::from_slice(bytes)
            .map(SecretKey)
            .map_err(|_| KeyError::MalformedInput("invalid secret scalar"))
    }

    pub fn from_hex(s: &str) -> Result<SecretKey, KeyError> {
        let bytes =
            hex::decode(s).map_err(|_| KeyError::MalformedInput("secret key is not hex"))?;
        SecretKey::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// Sign a 32-byte digest, normalizing to the low-`s` form.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Signature {
        let signature: p256::ecdsa::Signature = self
            .0
            .sign_prehash(digest)
            .expect("signing a 32-byte digest is infallible");
        let signature = signature.normalize_s().unwrap_or(signature);
        let bytes = signature
            .to_bytes()
            .as_slice()
            .try_into()
            .expect("P-256 signatures are 64 bytes");
        Signature(bytes)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.write_str("SecretKey(..)")
    }
}

/// A P-256 verifying key, kept in compressed SEC1 form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a SEC1-encoded point (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<PublicKey, KeyError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| KeyError::MalformedInput("point is not on the curve"))
    }

    pub fn from_hex(s: &str) -> Result<PublicKey, KeyError> {
        let bytes =
            hex::decode(s).map_err(|_| KeyError::MalformedInput("public key is not hex"))?;
        PublicKey::from_sec1_bytes(&bytes)
    }

    /// Compressed SEC1 encoding: a parity tag byte followed by `x`.
    pub fn to_compressed_bytes(&self) -> [u8; 33] {
        let point = self.0.to_encoded_point(true);
        point
            .as_bytes()
            .try_into()
            .expect("compressed P-256 points are 33 bytes")
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed_bytes())
    }

    /// Verify `signature` over a 32-byte digest.
    ///
    /// With `strict_low_s` set, high-`s` signatures are rejected outright.
    pub fn verify_digest(
        &self,
        digest: &[u8; 32],
        signature: &Signature,
        strict_low_s: bool,
    ) -> Result<(), KeyError> {
        let signature = p256::ecdsa::Signature::from_slice(&signature.0)
            .map_err(|_| KeyError::SignatureInvalid)?;
        if strict_low_s && bool::from(signature.s().is_high()) {
            return Err(KeyError::SignatureInvalid);
        }
        self.0
            .verify_prehash(digest, &signature)
            .map_err(|_| KeyError::SignatureInvalid)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

/// A raw 64-byte `r ‖ s` signature.
///
/// The bytes are not checked at construction; scalar validity surfaces as
/// `SignatureInvalid` at verification time.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// The all-zero placeholder used while a transaction is being built.
    pub fn placeholder() -> Signature {
        Signature([0; 64])
    }

    pub fn from_hex(s: &str) -> Result<Signature, KeyError> {
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| KeyError::MalformedInput("signature is not 64 hex-encoded bytes"))?;
        Ok(Signature(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.to_hex()).finish()
    }
}

impl DenaroSerialize for Signature {
    fn denaro_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.denaro_serialize(&mut target)
    }
}

impl DenaroDeserialize for Signature {
    fn denaro_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Signature(<[u8; 64]>::denaro_deserialize(&mut reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let key = SecretKey::generate();
        let digest = crate::serialization::sha256::digest(b"payload");
        let signature = key.sign_digest(&digest);

        let public = key.public_key();
        assert!(public.verify_digest(&digest, &signature, true).is_ok());

        let mut tampered = digest;
        tampered[0] ^= 1;
        assert_eq!(
            public.verify_digest(&tampered, &signature, true),
            Err(KeyError::SignatureInvalid)
        );
    }

    #[test]
    fn compressed_key_roundtrip() {
        let key = SecretKey::generate();
        let public = key.public_key();
        let restored = PublicKey::from_sec1_bytes(&public.to_compressed_bytes()).unwrap();
        assert_eq!(public, restored);
    }

    #[test]
    fn placeholder_signature_is_invalid() {
        let key = SecretKey::generate();
        let digest = crate::serialization::sha256::digest(b"payload");
        assert_eq!(
            key.public_key()
                .verify_digest(&digest, &Signature::placeholder(), false),
            Err(KeyError::SignatureInvalid)
        );
    }
}
