//! Progress events emitted by long-running computations.

use serde::{Deserialize, Serialize};

/// The loop a progress event was emitted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// POSW hash-chain construction.
    Chain,
    /// POSW leaf hashing.
    Leaf,
    /// Merkle level folding.
    Merkle,
    /// A hashcash attempt was rejected and a new nonce drawn.
    Hashcash,
    /// Batch opening.
    Open,
    /// MHG page materialization.
    Pages,
}

/// Advisory progress report. Unordered with respect to command completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct Progress {
    /// Which loop reported.
    pub phase: Phase,
    /// Units completed so far.
    pub done: u32,
    /// Units in the phase.
    pub total: u32,
    /// Zero-based attempt counter (hashcash events carry the rejected attempt).
    pub attempt: u32,
}

impl Progress {
    pub fn new(phase: Phase, done: u32, total: u32, attempt: u32) -> Self {
        Self {
            phase,
            done,
            total,
            attempt,
        }
    }
}
