//! Proof of sequential work.
//!
//! ## Construction
//!
//! ```text
//! chain[0] = H(posw|seed|, binding, "|", nonce)
//! chain[i] = H(posw|step|, be32(i), chain[i-1])      1 <= i <= L
//! leaf[i]  = H(leaf|, be32(i), chain[i])             0 <= i <= L
//! root     = Merkle(leaf[0..=L])
//! ```
//!
//! With a hashcash target, `H(hashcash|v3|, root, chain[L])` must have
//! `hashcash_bits` leading zero bits; otherwise a new nonce is drawn and the
//! whole chain is rebuilt.
//!
//! A [`PoswContext`] owns the chain and tree buffers for one INIT. Buffers are
//! allocated once and reused across COMMIT attempts.

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use tollgate_crypto::encoding::b64u_encode;
use tollgate_crypto::hash::{be32, hash, Domain};
use tollgate_types::progress::{Phase, Progress};
use tollgate_types::DEFAULT_YIELD_EVERY;

use crate::control::Control;
use crate::hashcash::{meets_target, random_nonce};
use crate::merkle::{leaf_hash, MerkleTree};
use crate::open::{plan, MidOpening, OpenEntry, OpenRequest};
use crate::{Digest, PowError, Result};

/// Chain genesis for a binding and nonce.
pub fn chain_seed(binding: &[u8], nonce: &[u8]) -> Digest {
    hash(Domain::PoswSeed, &[binding, b"|", nonce])
}

/// One sequential step.
pub fn chain_step(index: u32, prev: &Digest) -> Digest {
    hash(Domain::PoswStep, &[&be32(index), prev])
}

/// Walk the chain forward from the state at `from_index` to `to_index`.
pub fn chain_walk(from_index: u32, from: &Digest, to_index: u32) -> Digest {
    let mut state = *from;
    for i in from_index.saturating_add(1)..=to_index {
        state = chain_step(i, &state);
    }
    state
}

/// Normalized INIT parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoswParams {
    /// Host-chosen binding string mixed into the chain seed.
    pub binding: String,
    /// Chain length `L`.
    pub steps: u32,
    /// Leading zero bits the hashcash digest must carry; zero disables it.
    pub hashcash_bits: u32,
    /// Default segment length for OPEN, within `[1, steps]`.
    pub segment_len: u32,
    /// Loop iterations between cancellation checkpoints.
    pub yield_every: u32,
    /// Loop iterations between progress events.
    pub progress_every: u32,
}

impl PoswParams {
    /// `steps` below one is raised to one.
    pub fn new(binding: impl Into<String>, steps: u32) -> Result<Self> {
        let binding = binding.into();
        if binding.is_empty() {
            return Err(PowError::Configuration("bindingString required".to_string()));
        }
        if steps == u32::MAX {
            return Err(PowError::Configuration(format!("steps {steps} too large")));
        }
        Ok(Self {
            binding,
            steps: steps.max(1),
            hashcash_bits: 0,
            segment_len: 1,
            yield_every: DEFAULT_YIELD_EVERY,
            progress_every: DEFAULT_YIELD_EVERY,
        })
    }

    pub fn with_hashcash_bits(mut self, bits: u32) -> Self {
        self.hashcash_bits = bits;
        self
    }

    /// Clamped to `[1, steps]`.
    pub fn with_segment_len(mut self, segment_len: u32) -> Self {
        self.segment_len = segment_len.clamp(1, self.steps);
        self
    }

    pub fn with_cadence(mut self, yield_every: u32, progress_every: u32) -> Self {
        self.yield_every = yield_every.max(1);
        self.progress_every = progress_every.max(1);
        self
    }

    /// A [`Control`] for `cancel` with this context's reporting cadence.
    pub fn control(&self, cancel: CancellationToken) -> Control {
        Control::new(cancel).with_cadence(self.yield_every, self.progress_every)
    }

    /// `L + 1`: the genesis plus one leaf per step.
    pub fn leaf_count(&self) -> usize {
        self.steps as usize + 1
    }
}

/// A produced commitment. Immutable once returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    /// Merkle root over the chain leaves.
    pub root: Digest,
    /// The accepted nonce, exactly as hashed into the seed.
    pub nonce: String,
    /// Number of attempts it took, at least one.
    pub attempts: u32,
}

impl Commitment {
    pub fn root_b64(&self) -> String {
        b64u_encode(&self.root)
    }
}

/// Chain and tree state for one binding.
#[derive(Debug)]
pub struct PoswContext {
    params: PoswParams,
    chain: Vec<Digest>,
    tree: MerkleTree,
    commitment: Option<Commitment>,
}

impl PoswContext {
    /// Allocate buffers for `params.steps` steps.
    pub fn new(params: PoswParams) -> Result<Self> {
        let leaf_count = params.leaf_count();
        let tree = MerkleTree::allocate(leaf_count)?;
        debug!(
            steps = params.steps,
            hashcash_bits = params.hashcash_bits,
            segment_len = params.segment_len,
            "posw context allocated"
        );
        Ok(Self {
            chain: vec![[0u8; 32]; leaf_count],
            tree,
            params,
            commitment: None,
        })
    }

    pub fn params(&self) -> &PoswParams {
        &self.params
    }

    /// The last successful commitment, if the buffers still hold it.
    pub fn commitment(&self) -> Option<&Commitment> {
        self.commitment.as_ref()
    }

    pub fn chain(&self) -> &[Digest] {
        &self.chain
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Produce a fresh commitment with OS-random nonces.
    pub fn commit(&mut self, control: &Control) -> Result<Commitment> {
        self.commit_with(control, random_nonce)
    }

    /// Produce a fresh commitment, drawing each attempt's nonce from
    /// `next_nonce`. Any previous commitment is invalidated first, so an
    /// aborted COMMIT leaves the context without one.
    pub fn commit_with<F>(&mut self, control: &Control, mut next_nonce: F) -> Result<Commitment>
    where
        F: FnMut() -> String,
    {
        self.commitment = None;
        let mut attempt = 0u32;
        loop {
            control.checkpoint()?;
            let nonce = next_nonce();
            let root = self.build_attempt(&nonce, control, attempt)?;
            let last = self.chain[self.params.steps as usize];
            if meets_target(&root, &last, self.params.hashcash_bits) {
                let commitment = Commitment {
                    root,
                    nonce,
                    attempts: attempt.saturating_add(1),
                };
                debug!(attempts = commitment.attempts, "posw commitment accepted");
                self.commitment = Some(commitment.clone());
                return Ok(commitment);
            }
            attempt = attempt.saturating_add(1);
            trace!(attempt, bits = self.params.hashcash_bits, "hashcash target missed");
            control.emit(Progress::new(Phase::Hashcash, 0, 0, attempt));
        }
    }

    /// Fill chain, leaves and tree for one nonce; returns the root.
    fn build_attempt(&mut self, nonce: &str, control: &Control, attempt: u32) -> Result<Digest> {
        let steps = self.params.steps;
        self.chain[0] = chain_seed(self.params.binding.as_bytes(), nonce.as_bytes());
        for i in 1..=steps {
            let idx = i as usize;
            self.chain[idx] = chain_step(i, &self.chain[idx - 1]);
            control.tick(Phase::Chain, i, steps, attempt)?;
        }

        let leaf_total = steps + 1;
        for (i, (leaf, state)) in self.tree.leaves_mut().iter_mut().zip(&self.chain).enumerate() {
            let i = i as u32;
            *leaf = leaf_hash(i, state);
            control.tick(Phase::Leaf, i + 1, leaf_total, attempt)?;
        }

        self.tree.rebuild(control, attempt)
    }

    /// Open the committed chain at the requested positions.
    pub fn open(&self, request: &OpenRequest, control: &Control) -> Result<Vec<OpenEntry>> {
        if self.commitment.is_none() {
            return Err(PowError::CommitMissing);
        }
        let planned = plan(request, self.params.steps, self.params.segment_len)?;
        let total = u32::try_from(planned.len()).unwrap_or(u32::MAX);

        let mut entries = Vec::with_capacity(planned.len());
        for (pos, p) in planned.iter().enumerate() {
            control.checkpoint()?;
            let mid = match p.mid {
                Some(index) => Some(MidOpening {
                    index,
                    value: self.chain[index as usize],
                    proof: self.tree.proof(index as usize)?,
                }),
                None => None,
            };
            entries.push(OpenEntry {
                i: p.i,
                prev: p.prev,
                h_prev: self.chain[p.prev as usize],
                h_curr: self.chain[p.i as usize],
                proof_prev: self.tree.proof(p.prev as usize)?,
                proof_curr: self.tree.proof(p.i as usize)?,
                mid,
            });
            let done = u32::try_from(pos + 1).unwrap_or(u32::MAX);
            control.tick(Phase::Open, done, total, 0)?;
        }
        debug!(count = entries.len(), "posw openings produced");
        Ok(entries)
    }
}
