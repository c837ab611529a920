//! Deterministic parent and challenge sampling for the memory-hard graph.
//!
//! All randomness comes from `draw32`, a counter-mode PRF over
//! `H(MHG1-PRF, seed, label, be32(i), be32(ctr))`. Draws are reduced to a
//! range by rejection sampling, so every value in `0..modulus` is equally
//! likely.

use std::collections::HashSet;

use tollgate_crypto::hash::{be32, hash, Domain};

use crate::{PowError, Result};

/// First four digest bytes, big-endian.
pub fn draw32(seed: &[u8], label: &str, i: u32, ctr: u32) -> u32 {
    let digest = hash(Domain::MhgPrf, &[seed, label.as_bytes(), &be32(i), &be32(ctr)]);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Uniform draw in `0..modulus` starting at counter `ctr`.
///
/// Returns the value and the counter to continue from.
pub fn uniform_mod(seed: &[u8], label: &str, i: u32, modulus: u32, ctr: u32) -> Result<(u32, u32)> {
    if modulus == 0 {
        return Err(PowError::OutOfRange("modulus must be positive".to_string()));
    }
    let modulus = u64::from(modulus);
    let limit = (1u64 << 32) / modulus * modulus;
    let mut ctr = ctr;
    loop {
        let n = u64::from(draw32(seed, label, i, ctr));
        ctr = ctr.wrapping_add(1);
        if n < limit {
            // n % modulus < modulus <= u32::MAX
            return Ok(((n % modulus) as u32, ctr));
        }
    }
}

/// Draw `count` values in `0..max_exclusive` avoiding `exclude` and each
/// other.
///
/// When the range runs out of fresh values, the remaining slots are filled
/// with plain draws that may repeat.
pub fn pick_distinct(
    seed: &[u8],
    label: &str,
    i: u32,
    count: usize,
    max_exclusive: u32,
    exclude: &[u32],
) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(count);
    let mut seen: HashSet<u32> = exclude.iter().copied().collect();
    let mut ctr = 0;
    while out.len() < count && seen.len() < max_exclusive as usize {
        let (n, next) = uniform_mod(seed, label, i, max_exclusive, ctr)?;
        ctr = next;
        if seen.insert(n) {
            out.push(n);
        }
    }
    while out.len() < count {
        let (n, next) = uniform_mod(seed, label, i, max_exclusive, ctr)?;
        ctr = next;
        out.push(n);
    }
    Ok(out)
}

/// The three parents of a page. Every parent index is below the child's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parents {
    /// Always `i - 1`.
    pub p0: u32,
    /// First sampled parent.
    pub p1: u32,
    /// Second sampled parent.
    pub p2: u32,
}

impl Parents {
    pub fn as_array(&self) -> [u32; 3] {
        [self.p0, self.p1, self.p2]
    }
}

/// Parents of page `i`: the predecessor plus two distinct sampled pages.
pub fn parents_of(i: u32, seed: &[u8]) -> Result<Parents> {
    match i {
        0 => Err(PowError::OutOfRange("page 0 has no parents".to_string())),
        1 => Ok(Parents { p0: 0, p1: 0, p2: 0 }),
        2 => Ok(Parents { p0: 1, p1: 0, p2: 0 }),
        _ => {
            let p0 = i - 1;
            let p1 = pick_distinct(seed, "p1", i, 1, i, &[p0])?[0];
            let p2 = pick_distinct(seed, "p2", i, 1, i, &[p0, p1])?[0];
            Ok(Parents { p0, p1, p2 })
        }
    }
}

/// Challenge indices in `1..=max_index`. Always contains `1` and
/// `max_index`, then fills to `min(max_index, max(count, 2))` unique values.
pub fn sample_indices(max_index: u32, count: u32, seed: &[u8]) -> Result<Vec<u32>> {
    if max_index < 1 {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for forced in [1, max_index] {
        if seen.insert(forced) {
            out.push(forced);
        }
    }

    let target = max_index.min(count.max(out.len() as u32)) as usize;
    let mut ctr = 0;
    while out.len() < target {
        let (n, next) = uniform_mod(seed, "sample", max_index, max_index, ctr)?;
        ctr = next;
        let idx = n + 1;
        if seen.insert(idx) {
            out.push(idx);
        }
    }
    Ok(out)
}
