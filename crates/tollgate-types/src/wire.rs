//! JSON wire shapes for commitments, Merkle proofs and openings.
//!
//! Every digest, nonce and page crosses the wire as unpadded base64url text.
//! Conversion to and from the in-memory proof types lives in `tollgate-pow`.

use serde::{Deserialize, Serialize};

/// A published commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WireCommit {
    /// Merkle root, base64url (43 chars).
    pub root_b64: String,
    /// The accepted nonce, as hashed into the chain seed.
    pub nonce: String,
}

/// A Merkle inclusion proof.
///
/// `dirs` holds one character per level, leaf first: `0` when the running
/// node is the left child, `1` when it is the right child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct WireProof {
    /// Sibling digests, leaf level first.
    pub sibs: Vec<String>,
    /// One `0`/`1` per level: `1` when the running node is a right child.
    pub dirs: String,
}

/// One POSW opening: the segment endpoints (and optional midpoint) of a
/// requested index, each with its inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WireOpenEntry {
    /// Challenged chain index.
    pub i: u32,
    /// Segment start.
    pub prev: u32,
    /// Chain state at `prev`.
    pub h_prev: String,
    /// Chain state at `i`.
    pub h_curr: String,
    /// Inclusion proof for `prev`.
    pub proof_prev: WireProof,
    /// Inclusion proof for `i`.
    pub proof_curr: WireProof,
    /// Midpoint index, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub mid: Option<u32>,
    /// Chain state at `mid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub h_mid: Option<String>,
    /// Inclusion proof for `mid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub proof_mid: Option<WireProof>,
}

/// Inclusion proofs for an MHG page and its three parents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct WireMhgProofs {
    /// Proof for the child page.
    pub page: WireProof,
    /// Proof for `p0`.
    pub p0: WireProof,
    /// Proof for `p1`.
    pub p1: WireProof,
    /// Proof for `p2`.
    pub p2: WireProof,
}

/// One MHG opening: a child page, its three parent pages, and their proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct WireMhgOpening {
    /// Challenged page index.
    pub i: u32,
    /// Child page, base64url.
    pub page: String,
    /// Page `i - 1`, base64url.
    pub p0: String,
    /// First sampled parent, base64url.
    pub p1: String,
    /// Second sampled parent, base64url.
    pub p2: String,
    /// Inclusion proofs for the four pages.
    pub proof: WireMhgProofs,
}
