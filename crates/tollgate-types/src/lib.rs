//! # tollgate-types
//!
//! Shared types used across the tollgate workspace: the host message
//! protocol, the JSON wire shapes of commitments and openings, progress
//! events, and the data contracts of the external collaborators that feed
//! challenge parameters in and consume proofs out.

pub mod contracts;
pub mod progress;
pub mod protocol;
pub mod wire;

/// Random nonce length in bytes before base64url encoding.
pub const NONCE_BYTES: usize = 16;

/// Default cadence (in loop iterations) for yield/progress points.
pub const DEFAULT_YIELD_EVERY: u32 = 1024;

/// Default MHG page size in bytes.
pub const DEFAULT_PAGE_BYTES: usize = 64;

/// Default number of MHG mix rounds.
pub const DEFAULT_MIX_ROUNDS: u32 = 2;
