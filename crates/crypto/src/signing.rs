//! Ed25519 signing and verification for node, wallet and validator keys.
//!
//! Every signed artifact in the consensus layer (challenges, responses,
//! PODs, signed clocks, transition approvals) is a plain text message framed
//! by its owning component and signed with Ed25519. This module only deals
//! with bytes: it never frames messages itself, so framing stays next to the
//! code that has to agree bit-for-bit with legacy peers.
//!
//! # Security Model
//!
//! - Secret key material is zeroized after import
//! - `NodeKeys` never prints its secret half
//! - Verification failures are typed errors, never panics

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// Length of an Ed25519 secret or public key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Errors that can occur while handling keys or signatures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid key length: {actual} (expected {expected})")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid signature length: {actual} (expected {expected})")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    #[error("Signature verification failed")]
    VerificationFailed,
}

/// Result type for signing operations
pub type SignatureResult<T> = std::result::Result<T, SignatureError>;

/// An Ed25519 key pair held by a node, wallet or validator.
pub struct NodeKeys {
    signing_key: SigningKey,
    key_id: String,
}

impl NodeKeys {
    /// Generates a fresh key pair from the thread RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut secret = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();
        Self::from_signing_key(signing_key)
    }

    /// Imports a key pair from its 32-byte secret.
    ///
    /// # Security
    /// The intermediate copy of the secret is zeroized.
    pub fn from_bytes(secret: &[u8]) -> SignatureResult<Self> {
        if secret.len() != KEY_LENGTH {
            return Err(SignatureError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: secret.len(),
            });
        }

        let mut key_array = [0u8; KEY_LENGTH];
        key_array.copy_from_slice(secret);
        let signing_key = SigningKey::from_bytes(&key_array);
        key_array.zeroize();

        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let key_id = key_id(&signing_key.verifying_key());
        Self {
            signing_key,
            key_id,
        }
    }

    /// Secret half, for APIs that sign on the holder's behalf.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Stable short identifier of the public key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signs `message` and returns the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign_message(&self.signing_key, message)
    }
}

impl fmt::Debug for NodeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKeys")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Signs `message` with `key`, returning the raw signature bytes.
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verifies a raw Ed25519 signature over `message`.
///
/// # Returns
/// * `Ok(())` - signature is valid for `key`
/// * `Err(SignatureError)` - wrong length or verification failure
pub fn verify_signature(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> SignatureResult<()> {
    let bytes: [u8; SIGNATURE_LENGTH] =
        signature
            .try_into()
            .map_err(|_| SignatureError::InvalidSignatureLength {
                expected: SIGNATURE_LENGTH,
                actual: signature.len(),
            })?;
    let signature = Signature::from_bytes(&bytes);
    key.verify(message, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Parses a 32-byte Ed25519 public key.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> SignatureResult<VerifyingKey> {
    let array: [u8; KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: bytes.len(),
        })?;
    VerifyingKey::from_bytes(&array).map_err(|e| SignatureError::MalformedKey(e.to_string()))
}

/// Stable public key identifier: first 16 bytes of BLAKE3(public key), hex.
pub fn key_id(key: &VerifyingKey) -> String {
    let hash = blake3::hash(key.as_bytes());
    hex::encode(&hash.as_bytes()[..16])
}
