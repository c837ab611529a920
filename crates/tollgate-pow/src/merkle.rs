//! Binary Merkle tree over domain-separated SHA-256.
//!
//! Leaves are `H(leaf|, be32(i), payload)` and inner nodes
//! `H(node|, left, right)`. A level with an odd number of nodes pairs its
//! last node with itself, so level `k+1` always has `ceil(len(k) / 2)` nodes.
//!
//! All levels are kept in memory so proofs for arbitrary indices can be cut
//! after the fact without rehashing.

use tollgate_crypto::hash::{be32, hash, Domain};
use tollgate_types::progress::{Phase, Progress};

use crate::control::Control;
use crate::{Digest, PowError, Result};

/// Hash a leaf payload at position `index`.
pub fn leaf_hash(index: u32, payload: &[u8]) -> Digest {
    hash(Domain::MerkleLeaf, &[&be32(index), payload])
}

/// Hash two child nodes.
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    hash(Domain::MerkleNode, &[left, right])
}

/// Number of levels above the leaves for a tree of `leaf_count` leaves.
/// This is also the length of every inclusion proof.
pub fn tree_height(leaf_count: usize) -> usize {
    let mut height = 0;
    let mut count = leaf_count;
    while count > 1 {
        count = count.div_ceil(2);
        height += 1;
    }
    height
}

/// An inclusion proof, leaf to root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Sibling digests, leaf level first.
    pub siblings: Vec<Digest>,
    /// Per level: `true` when the running node is the right child.
    pub dirs: Vec<bool>,
}

impl MerkleProof {
    /// Fold `leaf` up through the siblings.
    pub fn root_from(&self, leaf: &Digest) -> Digest {
        let mut current = *leaf;
        for (sibling, &is_right) in self.siblings.iter().zip(&self.dirs) {
            current = if is_right {
                node_hash(sibling, &current)
            } else {
                node_hash(&current, sibling)
            };
        }
        current
    }

    /// The leaf index spelled by the direction bits.
    pub fn index(&self) -> u64 {
        self.dirs
            .iter()
            .enumerate()
            .fold(0u64, |acc, (level, &bit)| acc | (u64::from(bit) << level))
    }

    /// Plain fold check: does `leaf` reach `root` through this proof?
    pub fn verify(&self, root: &Digest, leaf: &Digest) -> bool {
        self.siblings.len() == self.dirs.len() && self.root_from(leaf) == *root
    }

    /// Fold check bound to a position: the proof must have exactly the height
    /// of a `leaf_count` tree and its directions must spell `index`.
    pub fn verify_at(&self, root: &Digest, leaf: &Digest, index: u32, leaf_count: usize) -> bool {
        (index as usize) < leaf_count
            && self.dirs.len() == tree_height(leaf_count)
            && self.index() == u64::from(index)
            && self.verify(root, leaf)
    }
}

/// A fully materialized Merkle tree.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Preallocate every level for `leaf_count` leaves, zero-filled.
    pub fn allocate(leaf_count: usize) -> Result<Self> {
        if leaf_count == 0 {
            return Err(PowError::Configuration(
                "merkle tree needs at least one leaf".to_string(),
            ));
        }
        let mut levels = vec![vec![[0u8; 32]; leaf_count]];
        let mut count = leaf_count;
        while count > 1 {
            count = count.div_ceil(2);
            levels.push(vec![[0u8; 32]; count]);
        }
        Ok(Self { levels })
    }

    /// Build a tree over `leaves`, reporting `merkle` progress per level.
    pub fn build(leaves: Vec<Digest>, control: &Control, attempt: u32) -> Result<Self> {
        let mut tree = Self::allocate(leaves.len())?;
        tree.levels[0] = leaves;
        tree.rebuild(control, attempt)?;
        Ok(tree)
    }

    /// Build without cancellation or progress.
    pub fn from_leaves(leaves: Vec<Digest>) -> Result<Self> {
        Self::build(leaves, &Control::detached(), 0)
    }

    /// Mutable access to the leaf level, for refilling before [`rebuild`].
    ///
    /// [`rebuild`]: MerkleTree::rebuild
    pub fn leaves_mut(&mut self) -> &mut [Digest] {
        &mut self.levels[0]
    }

    /// Recompute every inner level from the current leaves. Checks for
    /// cancellation per node and emits one progress event per level.
    pub fn rebuild(&mut self, control: &Control, attempt: u32) -> Result<Digest> {
        let height = self.height();
        let total = u32::try_from(height).unwrap_or(u32::MAX);
        for level in 0..height {
            let (lower, upper) = self.levels.split_at_mut(level + 1);
            let current = &lower[level];
            let next = &mut upper[0];
            let last = current.len() - 1;
            for (i, slot) in next.iter_mut().enumerate() {
                control.checkpoint()?;
                let left = &current[2 * i];
                let right = &current[(2 * i + 1).min(last)];
                *slot = node_hash(left, right);
            }
            control.emit(Progress::new(
                Phase::Merkle,
                u32::try_from(level + 1).unwrap_or(u32::MAX),
                total,
                attempt,
            ));
        }
        Ok(self.root())
    }

    pub fn root(&self) -> Digest {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn leaf(&self, index: usize) -> Option<&Digest> {
        self.levels[0].get(index)
    }

    /// Cut the inclusion proof for `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        if index >= self.leaf_count() {
            return Err(PowError::IndicesInvalid(format!(
                "leaf {index} outside tree of {}",
                self.leaf_count()
            )));
        }
        let height = self.height();
        let mut siblings = Vec::with_capacity(height);
        let mut dirs = Vec::with_capacity(height);
        let mut idx = index;
        for level in &self.levels[..height] {
            let sibling = if (idx ^ 1) < level.len() { idx ^ 1 } else { idx };
            siblings.push(level[sibling]);
            dirs.push(idx % 2 == 1);
            idx /= 2;
        }
        Ok(MerkleProof { siblings, dirs })
    }
}
