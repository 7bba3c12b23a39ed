//! Cryptographic primitives for LogiChain nodes.
//!
//! # Core Capabilities
//!
//! - **Digital Signatures**: Ed25519 sign/verify over legacy-framed messages
//! - **Key Management**: key pair generation, import with zeroization, key ids
//!
//! # Security Principles
//!
//! - All critical messages must be signed
//! - All signatures must be verified before trust
//! - Secrets must never be logged or hardcoded

pub mod signing;

pub use ed25519_dalek::{SigningKey, VerifyingKey};
pub use signing::{
    key_id, sign_message, verify_signature, verifying_key_from_bytes, NodeKeys, SignatureError,
    SignatureResult, KEY_LENGTH, SIGNATURE_LENGTH,
};
