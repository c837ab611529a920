//! Integration test crate for tollgate.
//!
//! The library holds the verifier-side glue a gate would run around the
//! proof engine: deriving a challenge from a matched [`ChallengeConfig`] and
//! decoding the worker's JSON replies. The scenarios themselves live under
//! `tests/` and exercise several workspace crates at once.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tollgate-integration-tests
//! ```

use serde_json::Value;

use tollgate_crypto::encoding::decode_digest;
use tollgate_pow::mhg::sample_indices;
use tollgate_pow::open::{mid_index, OpenEntry, OpenRequest};
use tollgate_pow::posw::Commitment;
use tollgate_pow::{PowError, Result, VerifyFailure};
use tollgate_types::contracts::ChallengeConfig;
use tollgate_types::wire::{WireCommit, WireOpenEntry};

/// Sample an OPEN challenge for a commitment made under `config`.
///
/// Indices always include `1` and `steps`; the first `spine_k` positions
/// whose segment can be bisected also request a midpoint.
pub fn posw_challenge(config: &ChallengeConfig, challenge_seed: &[u8]) -> Result<OpenRequest> {
    let steps = config.steps.max(1);
    let segment_len = config.segment_len.clamp(1, steps);
    let indices = sample_indices(steps, config.sample_k, challenge_seed)?;
    let spine: Vec<i64> = indices
        .iter()
        .enumerate()
        .filter(|(_, idx)| mid_index(**idx, u64::from(segment_len)).is_some())
        .take(config.spine_k as usize)
        .map(|(pos, _)| pos as i64)
        .collect();

    let mut request = OpenRequest::new(indices.into_iter().map(i64::from));
    if !spine.is_empty() {
        request = request.with_spine_pos(spine);
    }
    Ok(request)
}

/// Rebuild the verifier's view of a `COMMIT_OK` reply.
pub fn decode_commit(commit: &WireCommit) -> Result<Commitment> {
    let root = decode_digest(&commit.root_b64)
        .map_err(|e| PowError::from(VerifyFailure::Malformed(format!("rootB64: {e}"))))?;
    Ok(Commitment {
        root,
        nonce: commit.nonce.clone(),
        attempts: 1,
    })
}

/// Decode the `opens` array of an `OPEN_OK` reply.
pub fn decode_opens(opens: &Value) -> Result<Vec<OpenEntry>> {
    let wire: Vec<WireOpenEntry> = serde_json::from_value(opens.clone())
        .map_err(|e| PowError::from(VerifyFailure::Malformed(format!("opens: {e}"))))?;
    wire.iter().map(OpenEntry::try_from).collect()
}

/// Serialize `opens` the way a worker would put them on the wire.
pub fn encode_opens(opens: &[OpenEntry]) -> Value {
    let wire: Vec<WireOpenEntry> = opens.iter().map(WireOpenEntry::from).collect();
    serde_json::to_value(wire).unwrap_or(Value::Null)
}
