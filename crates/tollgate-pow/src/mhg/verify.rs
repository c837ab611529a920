//! MHG spot-check verification.
//!
//! For each opened page the verifier recomputes the parent indices itself,
//! checks all four inclusion proofs at those positions, recomputes page 0
//! whenever it appears as a parent, and finally recomputes the child from
//! its parents.

use tracing::debug;

use super::graph::parents_of;
use super::mix::MixContext;
use super::prover::{MhgOpening, MhgParams};
use crate::merkle::{leaf_hash, MerkleProof};
use crate::{Digest, Result, VerifyFailure};

/// Public inputs of an MHG commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MhgStatement {
    /// Graph seed.
    pub seed: Vec<u8>,
    /// Prover nonce.
    pub nonce: Vec<u8>,
    /// Committed root.
    pub root: Digest,
    /// Graph shape.
    pub params: MhgParams,
}

impl MhgStatement {
    fn check_inclusion(&self, index: u32, page: &[u8], proof: &MerkleProof) -> Result<()> {
        let leaf = leaf_hash(index, page);
        if !proof.verify_at(&self.root, &leaf, index, self.params.pages as usize) {
            return Err(VerifyFailure::ProofFailed { index }.into());
        }
        Ok(())
    }
}

/// Verify a batch of openings against `statement`.
pub fn verify_open_batch(statement: &MhgStatement, opens: &[MhgOpening]) -> Result<()> {
    let params = &statement.params;
    params.validate()?;
    if opens.is_empty() {
        return Err(VerifyFailure::Malformed("no openings".to_string()).into());
    }

    let mut mix = MixContext::new(&statement.seed, &statement.nonce);
    let mut genesis: Option<Vec<u8>> = None;

    for open in opens {
        let i = open.i;
        if i == 0 || i >= params.pages {
            return Err(VerifyFailure::Malformed(format!("page {i} cannot be opened")).into());
        }
        let pages = [&open.page, &open.p0, &open.p1, &open.p2];
        if pages.iter().any(|p| p.len() != params.page_bytes) {
            return Err(VerifyFailure::Malformed(format!(
                "opening {i} has pages of the wrong size"
            ))
            .into());
        }

        let parents = parents_of(i, &statement.seed)?;
        statement.check_inclusion(i, &open.page, &open.proof_page)?;
        statement.check_inclusion(parents.p0, &open.p0, &open.proof_p0)?;
        statement.check_inclusion(parents.p1, &open.p1, &open.proof_p1)?;
        statement.check_inclusion(parents.p2, &open.p2, &open.proof_p2)?;

        let parent_pages = [&open.p0, &open.p1, &open.p2];
        for (index, page) in parents.as_array().into_iter().zip(parent_pages) {
            if index != 0 {
                continue;
            }
            if genesis.is_none() {
                genesis = Some(mix.genesis(params.page_bytes)?);
            }
            if genesis.as_deref() != Some(page.as_slice()) {
                return Err(VerifyFailure::EquationFailed { index: 0 }.into());
            }
        }

        let recomputed = mix.mix(
            i,
            &open.p0,
            &open.p1,
            &open.p2,
            params.page_bytes,
            params.mix_rounds,
        )?;
        if recomputed != open.page {
            return Err(VerifyFailure::EquationFailed { index: i }.into());
        }
    }

    debug!(count = opens.len(), "mhg openings verified");
    Ok(())
}
