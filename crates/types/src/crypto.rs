//! Cryptographic key pairs and signatures.
//!
//! Peers and players sign with secp256k1 ECDSA using a hash-then-sign
//! construction: the message bytes are hashed with SHA-256 and the digest is
//! signed. Signatures are 64-byte compact encodings, public keys are 33-byte
//! compressed points.

use crate::PeerId;
use secp256k1::{ecdsa, Message, SecretKey, SECP256K1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a compact ECDSA signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of a compressed secp256k1 public key.
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// Hash the message and wrap the digest for signing.
fn message_digest(message: &[u8]) -> Message {
    let digest: [u8; 32] = Sha256::digest(message).into();
    Message::from_digest(digest)
}

/// A secp256k1 key pair for signing.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
            if let Ok(keypair) = Self::from_secret_bytes(&bytes) {
                return keypair;
            }
        }
    }

    /// Build a keypair from raw secret key bytes.
    ///
    /// Fails if the bytes are not exactly 32 long, are zero, or are not below
    /// the curve order.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = secp256k1::PublicKey::from_secret_key_global(&secret);
        Ok(Self {
            secret,
            public: PublicKey(public.serialize().to_vec()),
        })
    }

    /// Parse a keypair from a hex-encoded secret key.
    pub fn from_secret_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex.trim()).map_err(|_| CryptoError::InvalidHex)?;
        Self::from_secret_bytes(&bytes)
    }

    /// Derive a keypair from a seed (for testing/simulation).
    ///
    /// The seed is re-hashed until it lands on a valid scalar, so every seed
    /// yields a key.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut candidate = *blake3::hash(seed).as_bytes();
        loop {
            if let Ok(keypair) = Self::from_secret_bytes(&candidate) {
                return keypair;
            }
            candidate = *blake3::hash(&candidate).as_bytes();
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = SECP256K1.sign_ecdsa(&message_digest(message), &self.secret);
        Signature(signature.serialize_compact().to_vec())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    /// Get the peer identifier derived from the public key.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public)
    }

    /// Export the secret key as hex.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// A compressed secp256k1 public key.
///
/// Stored as raw bytes so that malformed keys received from the network can
/// be represented; they simply never verify.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap raw key bytes without validation.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse and validate a hex-encoded compressed public key.
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex.trim()).map_err(|_| CryptoError::InvalidHex)?;
        if secp256k1::PublicKey::from_slice(&bytes).is_err() {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(Self(bytes))
    }

    /// Get the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode the key as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Verify a signature over `message`.
    ///
    /// Returns false on a malformed key, malformed signature or mismatch.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let public = match secp256k1::PublicKey::from_slice(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        if signature.0.len() != SIGNATURE_LENGTH {
            return false;
        }
        let sig = match ecdsa::Signature::from_compact(&signature.0) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        SECP256K1
            .verify_ecdsa(&message_digest(message), &sig, &public)
            .is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        if hex.len() > 16 {
            write!(f, "PublicKey({}..{})", &hex[..8], &hex[hex.len() - 8..])
        } else {
            write!(f, "PublicKey({})", hex)
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A compact ECDSA signature.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Create a zero/placeholder signature for testing.
    pub fn zero() -> Self {
        Signature(vec![0u8; SIGNATURE_LENGTH])
    }

    /// Wrap raw signature bytes without validation.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        write!(f, "Signature({}..)", &hex[..hex.len().min(16)])
    }
}

/// Errors from key parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Secret key is zero, not below the curve order, or the wrong length.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Public key is not a valid compressed curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("key is not valid hex")]
    InvalidHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate();
        let message = b"test message";

        let signature = keypair.sign(message);
        let pubkey = keypair.public_key();

        assert!(pubkey.verify(message, &signature));
        assert!(!pubkey.verify(b"wrong message", &signature));
        assert_eq!(pubkey.as_bytes().len(), PUBLIC_KEY_LENGTH);
    }

    #[test]
    fn test_any_mutated_byte_invalidates() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let message = b"e2-e4".to_vec();
        let signature = keypair.sign(&message);

        for i in 0..message.len() {
            let mut mutated = message.clone();
            mutated[i] ^= 0x01;
            assert!(!keypair.public_key().verify(&mutated, &signature));
        }

        for i in 0..SIGNATURE_LENGTH {
            let mut bytes = signature.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            assert!(!keypair
                .public_key()
                .verify(&message, &Signature::from_bytes(bytes)));
        }
    }

    #[test]
    fn test_round_trip_across_payload_sizes() {
        for seed in 0u8..8 {
            let keypair = KeyPair::from_seed(&[seed; 32]);
            for len in [0usize, 1, 31, 32, 33, 1024] {
                let payload = vec![seed; len];
                assert!(keypair.public_key().verify(&payload, &keypair.sign(&payload)));
            }
        }
    }

    #[test]
    fn test_malformed_inputs_never_verify() {
        let keypair = KeyPair::from_seed(&[1u8; 32]);
        let signature = keypair.sign(b"msg");

        // Wrong length signature
        let short = Signature::from_bytes(signature.as_bytes()[..63].to_vec());
        assert!(!keypair.public_key().verify(b"msg", &short));

        // Garbage public key, including the encoding of the point at infinity
        assert!(!PublicKey::from_bytes(vec![0u8; 33]).verify(b"msg", &signature));
        assert!(!PublicKey::from_bytes(vec![0u8]).verify(b"msg", &signature));
        assert!(!PublicKey::from_bytes(vec![]).verify(b"msg", &signature));

        // Signature from a different key
        let other = KeyPair::from_seed(&[2u8; 32]);
        assert!(!other.public_key().verify(b"msg", &signature));
    }

    #[test]
    fn test_invalid_secret_keys_rejected() {
        assert_eq!(
            KeyPair::from_secret_bytes(&[0u8; 32]).unwrap_err(),
            CryptoError::InvalidSecretKey
        );
        assert_eq!(
            KeyPair::from_secret_bytes(&[0xFFu8; 32]).unwrap_err(),
            CryptoError::InvalidSecretKey
        );
        assert!(KeyPair::from_secret_bytes(&[1u8; 31]).is_err());
        assert!(KeyPair::from_secret_hex("not hex").is_err());
    }

    #[test]
    fn test_secret_hex_round_trip() {
        let keypair = KeyPair::from_seed(&[9u8; 32]);
        let restored = KeyPair::from_secret_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(keypair.public_key(), restored.public_key());

        let parsed = PublicKey::from_hex(&keypair.public_key().to_hex()).unwrap();
        assert_eq!(parsed, keypair.public_key());
        assert_eq!(
            PublicKey::from_hex(&"00".repeat(33)),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_signing_is_deterministic() {
        let keypair = KeyPair::from_seed(&[3u8; 32]);
        assert_eq!(keypair.sign(b"same"), keypair.sign(b"same"));
    }
}
