//! # tollgate-crypto
//!
//! Cryptographic primitives for the tollgate proof-of-work gate.
//!
//! The suite is fixed: SHA-256 for every digest, AES-256-CBC for the
//! memory-hard page mixer, and unpadded base64url for everything that crosses
//! the wire. No algorithm negotiation is permitted.
//!
//! ## Modules
//!
//! - [`hash`]: Domain-separated SHA-256 (the nine registered prefixes)
//! - [`aes_cbc`]: AES-256-CBC page cipher with truncated output
//! - [`encoding`]: base64url (no padding) digests and byte strings

pub mod aes_cbc;
pub mod encoding;
pub mod hash;

/// Size of every digest produced by [`hash::hash`].
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest.
pub type Digest = [u8; DIGEST_LEN];

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid key or IV length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// base64url decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
