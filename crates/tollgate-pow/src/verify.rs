//! POSW spot-check verification.
//!
//! The verifier never sees the chain. For each challenged index it checks
//! that both segment endpoints (and the midpoint, when requested) are in the
//! committed tree at the positions the challenge implies, then walks the
//! segment forward itself. Segments starting at zero are additionally tied to
//! the binding and nonce through the seed hash.

use tracing::debug;

use crate::hashcash::hashcash_bits;
use crate::merkle::{leaf_hash, MerkleProof};
use crate::open::{plan, OpenEntry, OpenRequest, PlannedOpen};
use crate::posw::{chain_seed, chain_walk, Commitment, PoswParams};
use crate::{Digest, Result, VerifyFailure};

/// Everything the verifier knows about a commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoswStatement {
    /// Binding string the prover was initialized with.
    pub binding: String,
    /// Nonce from COMMIT.
    pub nonce: String,
    /// Root from COMMIT.
    pub root: Digest,
    /// Chain length `L`.
    pub steps: u32,
    /// Required hashcash difficulty.
    pub hashcash_bits: u32,
    /// Default segment length the challenge was issued with.
    pub segment_len: u32,
}

impl PoswStatement {
    pub fn new(params: &PoswParams, commitment: &Commitment) -> Self {
        Self {
            binding: params.binding.clone(),
            nonce: commitment.nonce.clone(),
            root: commitment.root,
            steps: params.steps,
            hashcash_bits: params.hashcash_bits,
            segment_len: params.segment_len,
        }
    }

    fn leaf_count(&self) -> usize {
        self.steps as usize + 1
    }

    fn check_inclusion(&self, index: u32, value: &Digest, proof: &MerkleProof) -> Result<()> {
        let leaf = leaf_hash(index, value);
        if !proof.verify_at(&self.root, &leaf, index, self.leaf_count()) {
            return Err(VerifyFailure::ProofFailed { index }.into());
        }
        Ok(())
    }
}

fn check_shape(planned: &PlannedOpen, entry: &OpenEntry) -> Result<()> {
    let mid = entry.mid.as_ref().map(|m| m.index);
    if entry.i != planned.i || entry.prev != planned.prev || mid != planned.mid {
        return Err(VerifyFailure::Malformed(format!(
            "entry ({}, {}, {:?}) does not answer challenge ({}, {}, {:?})",
            entry.i, entry.prev, mid, planned.i, planned.prev, planned.mid
        ))
        .into());
    }
    Ok(())
}

/// Verify `entries` as the answer to `challenge` under `statement`.
///
/// Invalid challenges are reported as `indices_invalid`, exactly as the
/// prover would have reported them.
pub fn verify_openings(
    statement: &PoswStatement,
    challenge: &OpenRequest,
    entries: &[OpenEntry],
) -> Result<()> {
    let planned = plan(challenge, statement.steps, statement.segment_len)?;
    if planned.len() != entries.len() {
        return Err(VerifyFailure::Malformed(format!(
            "{} entries for {} challenged indices",
            entries.len(),
            planned.len()
        ))
        .into());
    }

    let seed = chain_seed(statement.binding.as_bytes(), statement.nonce.as_bytes());
    for (p, entry) in planned.iter().zip(entries) {
        check_shape(p, entry)?;
        statement.check_inclusion(entry.prev, &entry.h_prev, &entry.proof_prev)?;
        statement.check_inclusion(entry.i, &entry.h_curr, &entry.proof_curr)?;

        if entry.prev == 0 && entry.h_prev != seed {
            return Err(VerifyFailure::SeedFailed.into());
        }

        let reached = match &entry.mid {
            Some(mid) => {
                statement.check_inclusion(mid.index, &mid.value, &mid.proof)?;
                if chain_walk(entry.prev, &entry.h_prev, mid.index) != mid.value {
                    return Err(VerifyFailure::ChainFailed { index: entry.i }.into());
                }
                chain_walk(mid.index, &mid.value, entry.i)
            }
            None => chain_walk(entry.prev, &entry.h_prev, entry.i),
        };
        if reached != entry.h_curr {
            return Err(VerifyFailure::ChainFailed { index: entry.i }.into());
        }
    }

    if statement.hashcash_bits > 0 {
        let last = entries
            .iter()
            .find(|e| e.i == statement.steps)
            .ok_or(VerifyFailure::HashcashMissing)?;
        let actual = hashcash_bits(&statement.root, &last.h_curr);
        if actual < statement.hashcash_bits {
            return Err(VerifyFailure::HashcashFailed {
                required: statement.hashcash_bits,
                actual,
            }
            .into());
        }
    }

    debug!(count = entries.len(), "posw openings verified");
    Ok(())
}
