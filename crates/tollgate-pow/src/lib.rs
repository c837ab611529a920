//! # tollgate-pow
//!
//! Proof construction and spot-check verification for the tollgate
//! proof-of-work gate.
//!
//! Two constructions share one shape: derive a deterministic artifact from a
//! binding and a nonce, commit to it with a Merkle tree, then let a verifier
//! sample positions and check them through Merkle openings and local
//! recomputation.
//!
//! ## Modules
//!
//! - [`control`]: Cancellation token and progress cadence for long loops
//! - [`merkle`]: Duplicate-last-node Merkle tree with indexed proofs
//! - [`hashcash`]: Nonce drawing and the leading-zero-bits target
//! - [`posw`]: Proof of sequential work: hash chain, commit and open
//! - [`open`]: OPEN request validation and opening entries
//! - [`verify`]: POSW spot-check verifier
//! - [`mhg`]: Memory-hard graph: sampler, page mixer, prover, verifier
//! - [`wire`]: Conversion to and from the base64url JSON wire shapes

pub mod control;
pub mod hashcash;
pub mod merkle;
pub mod mhg;
pub mod open;
pub mod posw;
pub mod verify;
pub mod wire;

pub use tollgate_crypto::Digest;

use tollgate_crypto::CryptoError;

/// Coarse error taxonomy, used by hosts to decide between retrying the whole
/// challenge and failing permanently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid INIT parameters.
    Configuration,
    /// Protocol misuse: OPEN before COMMIT, use after DISPOSE.
    State,
    /// Malformed OPEN request.
    Validation,
    /// Cooperative cancellation observed mid-operation.
    Aborted,
    /// Verifier-side rejection.
    Verification,
    /// Primitive failure that should not happen with validated inputs.
    Internal,
}

/// Reasons a verifier rejects an opening.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyFailure {
    /// A Merkle inclusion proof did not reproduce the committed root.
    #[error("merkle proof failed for index {index}")]
    ProofFailed {
        /// Leaf index whose proof failed.
        index: u32,
    },

    /// Recomputing a page from its opened parents gave a different page.
    #[error("page equation failed for index {index}")]
    EquationFailed {
        /// Index of the child page.
        index: u32,
    },

    /// Walking the hash chain forward did not reach the opened value.
    #[error("chain segment failed for index {index}")]
    ChainFailed {
        /// Index of the opened segment end.
        index: u32,
    },

    /// The opened chain genesis does not match the binding and nonce.
    #[error("chain seed does not match binding and nonce")]
    SeedFailed,

    /// The commitment does not meet the hashcash target.
    #[error("hashcash target not met (need {required} leading zero bits, got {actual})")]
    HashcashFailed {
        /// Required number of leading zero bits.
        required: u32,
        /// Actual number of leading zero bits found.
        actual: u32,
    },

    /// A hashcash target is set but the final chain state was not opened.
    #[error("hashcash target set but final index not opened")]
    HashcashMissing,

    /// The opening does not have the shape the challenge asked for.
    #[error("malformed opening: {0}")]
    Malformed(String),
}

impl VerifyFailure {
    /// Stable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ProofFailed { .. } => "proof_failed",
            Self::EquationFailed { .. } => "equation_failed",
            Self::ChainFailed { .. } => "chain_failed",
            Self::SeedFailed => "seed_failed",
            Self::HashcashFailed { .. } => "hashcash_failed",
            Self::HashcashMissing => "hashcash_missing",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Error types for proof-of-work operations.
#[derive(Debug, thiserror::Error)]
pub enum PowError {
    /// INIT parameters are missing or out of bounds.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// No context has been initialized.
    #[error("not initialized")]
    NotInitialized,

    /// OPEN was requested before a successful COMMIT.
    #[error("commit missing")]
    CommitMissing,

    /// The worker was disposed.
    #[error("worker disposed")]
    Disposed,

    /// OPEN indices are missing, out of range, duplicated or inconsistent.
    #[error("indices invalid: {0}")]
    IndicesInvalid(String),

    /// A sampler argument is outside its domain.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Cancellation was observed at a checkpoint.
    #[error("aborted")]
    Aborted,

    /// Verifier-side rejection.
    #[error("verification failed: {0}")]
    Verification(#[from] VerifyFailure),

    /// Underlying primitive failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl PowError {
    /// The taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::NotInitialized | Self::CommitMissing | Self::Disposed => ErrorKind::State,
            Self::IndicesInvalid(_) | Self::OutOfRange(_) => ErrorKind::Validation,
            Self::Aborted => ErrorKind::Aborted,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Crypto(_) => ErrorKind::Internal,
        }
    }

    /// Stable, enumerable reason code suitable for logs and wire replies.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config_invalid",
            Self::NotInitialized => "not_initialized",
            Self::CommitMissing => "commit_missing",
            Self::Disposed => "disposed",
            Self::IndicesInvalid(_) => "indices_invalid",
            Self::OutOfRange(_) => "out_of_range",
            Self::Aborted => "aborted",
            Self::Verification(failure) => failure.reason(),
            Self::Crypto(_) => "crypto_error",
        }
    }

    /// State errors signal protocol misuse; retrying the challenge will not help.
    pub fn is_permanent(&self) -> bool {
        self.kind() == ErrorKind::State
    }
}

/// Convenience result type for PoW operations.
pub type Result<T> = std::result::Result<T, PowError>;
