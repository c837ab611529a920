//! AES-CBC page mixer.
//!
//! Page `i` is derived from its three parents by `mix_rounds` rounds of
//! data-dependent byte rotations, XOR and two AES-256-CBC passes. Rotation
//! offsets start from `H(MHG1-PA, seed, nonce, be32(i))` and are perturbed by
//! the first four bytes of the running state each round, so the access
//! pattern into the parents cannot be precomputed. The CBC IVs come from
//! `H(MHG1-PB, seed, nonce, be32(i))`.
//!
//! Page 0 has no parents: it is the CBC encryption of the repeated key
//! material under the page-0 IV.

use std::collections::HashMap;

use tollgate_crypto::aes_cbc::{CbcCipher, BLOCK_SIZE};
use tollgate_crypto::hash::{be32, hash, Domain};

use crate::{Digest, PowError, Result};

/// Smallest supported page: one cipher block.
pub const MIN_PAGE_BYTES: usize = BLOCK_SIZE;

const GOLDEN: u32 = 0x9e37_79b9;

#[derive(Clone, Copy)]
struct PageKeys {
    pa: Digest,
    pb: Digest,
}

/// Keyed state shared by every page of one `(seed, nonce)` graph.
///
/// Holds the imported cipher. A context from [`MixContext::new`] also caches
/// the per-index PA/PB derivations, so each is hashed once however many
/// times a page is mixed; one from [`MixContext::streaming`] does not.
pub struct MixContext {
    seed: Vec<u8>,
    nonce: Vec<u8>,
    key_material: Digest,
    cipher: CbcCipher,
    derived: HashMap<u32, PageKeys>,
    retain: bool,
}

impl std::fmt::Debug for MixContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixContext")
            .field("seed_len", &self.seed.len())
            .field("nonce_len", &self.nonce.len())
            .field("cached", &self.derived.len())
            .finish_non_exhaustive()
    }
}

fn check_page_bytes(page_bytes: usize) -> Result<()> {
    if page_bytes < MIN_PAGE_BYTES {
        return Err(PowError::Configuration(format!(
            "page size {page_bytes} below {MIN_PAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn rotl_bytes(buf: &[u8], k: usize) -> Vec<u8> {
    let mut out = buf.to_vec();
    if !out.is_empty() {
        let n = out.len();
        out.rotate_left(k % n);
    }
    out
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

impl MixContext {
    pub fn new(seed: &[u8], nonce: &[u8]) -> Self {
        let key_material = hash(Domain::MhgKey, &[seed, nonce]);
        Self {
            seed: seed.to_vec(),
            nonce: nonce.to_vec(),
            cipher: CbcCipher::new(&key_material),
            key_material,
            derived: HashMap::new(),
            retain: true,
        }
    }

    /// A context for mixing each index once, as a full graph build does.
    pub fn streaming(seed: &[u8], nonce: &[u8]) -> Self {
        Self {
            retain: false,
            ..Self::new(seed, nonce)
        }
    }

    /// Number of page indices whose PA/PB have been derived so far.
    pub fn cached_derivations(&self) -> usize {
        self.derived.len()
    }

    fn page_keys(&mut self, i: u32) -> PageKeys {
        let (seed, nonce) = (&self.seed, &self.nonce);
        let derive = || PageKeys {
            pa: hash(Domain::MhgPa, &[seed, nonce, &be32(i)]),
            pb: hash(Domain::MhgPb, &[seed, nonce, &be32(i)]),
        };
        if !self.retain {
            return derive();
        }
        *self.derived.entry(i).or_insert_with(derive)
    }

    /// Page 0.
    pub fn genesis(&mut self, page_bytes: usize) -> Result<Vec<u8>> {
        check_page_bytes(page_bytes)?;
        let plaintext: Vec<u8> = (0..page_bytes)
            .map(|j| self.key_material[j % self.key_material.len()])
            .collect();
        let keys = self.page_keys(0);
        let iv = iv_half(&keys.pb, 0);
        Ok(self.cipher.encrypt_truncated(&iv, &plaintext, page_bytes)?)
    }

    /// Page `i` from parents `p0`, `p1`, `p2`.
    pub fn mix(
        &mut self,
        i: u32,
        p0: &[u8],
        p1: &[u8],
        p2: &[u8],
        page_bytes: usize,
        mix_rounds: u32,
    ) -> Result<Vec<u8>> {
        check_page_bytes(page_bytes)?;
        if mix_rounds == 0 {
            return Err(PowError::Configuration("mix rounds must be positive".to_string()));
        }
        for (name, page) in [("p0", p0), ("p1", p1), ("p2", p2)] {
            if page.len() != page_bytes {
                return Err(PowError::Configuration(format!(
                    "{name} has {} bytes, expected {page_bytes}",
                    page.len()
                )));
            }
        }

        let keys = self.page_keys(i);
        let p = page_bytes as u64;
        let mut dyn_offsets = [0u64; 5];
        for (k, slot) in dyn_offsets.iter_mut().enumerate() {
            *slot = u64::from(be_u32(&keys.pa[4 * k..])) % p;
        }
        let iv1 = iv_half(&keys.pb, 0);
        let iv2 = iv_half(&keys.pb, 1);

        let mut state = p0.to_vec();
        for _ in 0..mix_rounds {
            let dep = be_u32(&state);
            let perturb = [
                dep,
                dep.rotate_left(8),
                dep.rotate_left(16),
                dep.rotate_left(24),
                dep ^ GOLDEN,
            ];
            for (slot, add) in dyn_offsets.iter_mut().zip(perturb) {
                *slot = (*slot + u64::from(add)) % p;
            }
            // offsets are reduced mod page_bytes
            let [d1, d2, d3, d4, d5] = dyn_offsets.map(|d| d as usize);

            let mut x0 = state;
            xor_into(&mut x0, &rotl_bytes(p1, d1));
            xor_into(&mut x0, &rotl_bytes(p2, d2));
            let x1 = self.cipher.encrypt_truncated(&iv1, &x0, page_bytes)?;

            let mut x2 = x1.clone();
            xor_into(&mut x2, &rotl_bytes(p1, d3));
            xor_into(&mut x2, &rotl_bytes(p2, d4));
            let mut x3 = self.cipher.encrypt_truncated(&iv2, &x2, page_bytes)?;

            xor_into(&mut x3, &x0);
            xor_into(&mut x3, &rotl_bytes(&x1, d5));
            state = x3;
        }
        Ok(state)
    }
}

fn iv_half(pb: &Digest, half: usize) -> [u8; BLOCK_SIZE] {
    let mut iv = [0u8; BLOCK_SIZE];
    iv.copy_from_slice(&pb[half * BLOCK_SIZE..(half + 1) * BLOCK_SIZE]);
    iv
}

/// One-shot mix without a shared context.
pub fn mix_page(
    seed: &[u8],
    nonce: &[u8],
    i: u32,
    parents: [&[u8]; 3],
    page_bytes: usize,
    mix_rounds: u32,
) -> Result<Vec<u8>> {
    let [p0, p1, p2] = parents;
    MixContext::new(seed, nonce).mix(i, p0, p1, p2, page_bytes, mix_rounds)
}
