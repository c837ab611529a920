//! Hashcash target over a POSW commitment.
//!
//! A commitment is accepted when `H(hashcash|v3|, root, chain[L])` has at
//! least `bits` leading zero bits. Each rejected attempt costs a fresh nonce
//! and a full chain rebuild, so the target multiplies the sequential work by
//! roughly `2^bits`.

use tollgate_crypto::encoding::b64u_encode;
use tollgate_crypto::hash::{hash, leading_zero_bits, Domain};
use tollgate_types::NONCE_BYTES;

use crate::Digest;

/// Draw a fresh nonce: 16 bytes from the OS RNG, base64url without padding.
///
/// The nonce enters the chain seed as its ASCII text, not its decoded bytes.
pub fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    b64u_encode(&bytes)
}

/// The digest compared against the target.
pub fn hashcash_digest(root: &Digest, last: &Digest) -> Digest {
    hash(Domain::Hashcash, &[root, last])
}

/// Number of leading zero bits of the hashcash digest.
pub fn hashcash_bits(root: &Digest, last: &Digest) -> u32 {
    leading_zero_bits(&hashcash_digest(root, last))
}

/// Whether `(root, last)` satisfies a target of `bits`. A zero target always
/// passes.
pub fn meets_target(root: &Digest, last: &Digest, bits: u32) -> bool {
    bits == 0 || hashcash_bits(root, last) >= bits
}
