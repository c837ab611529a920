//! MHG prover: materialize every page, commit, open on demand.

use tracing::debug;

use tollgate_types::progress::Phase;
use tollgate_types::{DEFAULT_MIX_ROUNDS, DEFAULT_PAGE_BYTES};

use super::graph::parents_of;
use super::mix::{MixContext, MIN_PAGE_BYTES};
use crate::control::Control;
use crate::merkle::{leaf_hash, MerkleProof, MerkleTree};
use crate::{Digest, PowError, Result};

/// Graph shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MhgParams {
    /// Number of pages, including page 0.
    pub pages: u32,
    /// Bytes per page.
    pub page_bytes: usize,
    /// Mixing rounds per page.
    pub mix_rounds: u32,
}

impl MhgParams {
    pub fn new(pages: u32) -> Result<Self> {
        let params = Self {
            pages,
            page_bytes: DEFAULT_PAGE_BYTES,
            mix_rounds: DEFAULT_MIX_ROUNDS,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_page_bytes(mut self, page_bytes: usize) -> Self {
        self.page_bytes = page_bytes;
        self
    }

    pub fn with_mix_rounds(mut self, mix_rounds: u32) -> Self {
        self.mix_rounds = mix_rounds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages < 2 {
            return Err(PowError::Configuration(format!(
                "graph needs at least 2 pages, got {}",
                self.pages
            )));
        }
        if self.page_bytes < MIN_PAGE_BYTES {
            return Err(PowError::Configuration(format!(
                "page size {} below {MIN_PAGE_BYTES} bytes",
                self.page_bytes
            )));
        }
        if self.mix_rounds == 0 {
            return Err(PowError::Configuration("mix rounds must be positive".to_string()));
        }
        Ok(())
    }
}

/// One opened page with its parents and their inclusion proofs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MhgOpening {
    /// Challenged page index, at least one.
    pub i: u32,
    /// Page `i`.
    pub page: Vec<u8>,
    /// Page `i - 1`.
    pub p0: Vec<u8>,
    /// First sampled parent.
    pub p1: Vec<u8>,
    /// Second sampled parent.
    pub p2: Vec<u8>,
    /// Inclusion proof for `page`.
    pub proof_page: MerkleProof,
    /// Inclusion proof for `p0`.
    pub proof_p0: MerkleProof,
    /// Inclusion proof for `p1`.
    pub proof_p1: MerkleProof,
    /// Inclusion proof for `p2`.
    pub proof_p2: MerkleProof,
}

/// A fully materialized graph and its commitment.
#[derive(Debug)]
pub struct MhgProver {
    params: MhgParams,
    seed: Vec<u8>,
    pages: Vec<Vec<u8>>,
    tree: MerkleTree,
}

impl MhgProver {
    /// Compute every page in index order and commit to them.
    pub fn build(seed: &[u8], nonce: &[u8], params: MhgParams, control: &Control) -> Result<Self> {
        params.validate()?;
        let mut mix = MixContext::streaming(seed, nonce);
        let total = params.pages;
        let mut pages = Vec::with_capacity(total as usize);
        pages.push(mix.genesis(params.page_bytes)?);
        control.tick(Phase::Pages, 1, total, 0)?;

        for i in 1..total {
            let parents = parents_of(i, seed)?;
            let page = mix.mix(
                i,
                &pages[parents.p0 as usize],
                &pages[parents.p1 as usize],
                &pages[parents.p2 as usize],
                params.page_bytes,
                params.mix_rounds,
            )?;
            pages.push(page);
            control.tick(Phase::Pages, i + 1, total, 0)?;
        }
        Self::from_pages(seed, params, pages, control)
    }

    /// Commit to externally supplied pages without checking how they were
    /// derived.
    pub fn from_pages(
        seed: &[u8],
        params: MhgParams,
        pages: Vec<Vec<u8>>,
        control: &Control,
    ) -> Result<Self> {
        params.validate()?;
        if pages.len() != params.pages as usize {
            return Err(PowError::Configuration(format!(
                "{} pages supplied for a graph of {}",
                pages.len(),
                params.pages
            )));
        }
        if let Some(bad) = pages.iter().position(|p| p.len() != params.page_bytes) {
            return Err(PowError::Configuration(format!(
                "page {bad} is not {} bytes",
                params.page_bytes
            )));
        }
        let leaves = pages
            .iter()
            .enumerate()
            .map(|(i, page)| leaf_hash(i as u32, page))
            .collect();
        let tree = MerkleTree::build(leaves, control, 0)?;
        debug!(pages = params.pages, page_bytes = params.page_bytes, "mhg graph committed");
        Ok(Self {
            params,
            seed: seed.to_vec(),
            pages,
            tree,
        })
    }

    pub fn params(&self) -> &MhgParams {
        &self.params
    }

    pub fn root(&self) -> Digest {
        self.tree.root()
    }

    pub fn page(&self, i: u32) -> Option<&[u8]> {
        self.pages.get(i as usize).map(Vec::as_slice)
    }

    /// Open each index in `1..pages` with its parents.
    pub fn open(&self, indices: &[u32]) -> Result<Vec<MhgOpening>> {
        if indices.is_empty() {
            return Err(PowError::IndicesInvalid("indices required".to_string()));
        }
        let mut seen = std::collections::HashSet::with_capacity(indices.len());
        let mut opens = Vec::with_capacity(indices.len());
        for &i in indices {
            if i == 0 || i >= self.params.pages {
                return Err(PowError::IndicesInvalid(format!(
                    "page {i} outside 1..{}",
                    self.params.pages
                )));
            }
            if !seen.insert(i) {
                return Err(PowError::IndicesInvalid(format!("duplicate page {i}")));
            }
            let parents = parents_of(i, &self.seed)?;
            let [a, b, c] = parents.as_array().map(|p| p as usize);
            opens.push(MhgOpening {
                i,
                page: self.pages[i as usize].clone(),
                p0: self.pages[a].clone(),
                p1: self.pages[b].clone(),
                p2: self.pages[c].clone(),
                proof_page: self.tree.proof(i as usize)?,
                proof_p0: self.tree.proof(a)?,
                proof_p1: self.tree.proof(b)?,
                proof_p2: self.tree.proof(c)?,
            });
        }
        Ok(opens)
    }
}
