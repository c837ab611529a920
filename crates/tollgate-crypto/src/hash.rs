//! Domain-separated SHA-256 hashing for the tollgate protocol.
//!
//! SHA-256 serves nine distinct purposes across the two constructions.
//! Cross-domain collisions are prevented by a mandatory ASCII prefix per
//! purpose, prepended verbatim before the hashed parts.
//!
//! ## Domains
//!
//! | Domain | Prefix | Used by |
//! |--------|--------|---------|
//! | [`Domain::PoswSeed`] | `posw\|seed\|` | chain genesis |
//! | [`Domain::PoswStep`] | `posw\|step\|` | chain steps |
//! | [`Domain::MerkleLeaf`] | `leaf\|` | Merkle leaves |
//! | [`Domain::MerkleNode`] | `node\|` | Merkle inner nodes |
//! | [`Domain::Hashcash`] | `hashcash\|v3\|` | commit grinding |
//! | [`Domain::MhgPrf`] | `MHG1-PRF` | graph sampler |
//! | [`Domain::MhgKey`] | `MHG1-KEY` | page cipher key |
//! | [`Domain::MhgPa`] | `MHG1-PA` | rotation offsets |
//! | [`Domain::MhgPb`] | `MHG1-PB` | cipher IVs |
//!
//! The set is closed: a typo in a prefix cannot silently create a new domain.

use sha2::{Digest as _, Sha256};

use crate::Digest;

/// Registered hash domains. Each maps to exactly one byte prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    PoswSeed,
    PoswStep,
    MerkleLeaf,
    MerkleNode,
    Hashcash,
    MhgPrf,
    MhgKey,
    MhgPa,
    MhgPb,
}

impl Domain {
    /// All registered domains.
    pub const ALL: [Domain; 9] = [
        Domain::PoswSeed,
        Domain::PoswStep,
        Domain::MerkleLeaf,
        Domain::MerkleNode,
        Domain::Hashcash,
        Domain::MhgPrf,
        Domain::MhgKey,
        Domain::MhgPa,
        Domain::MhgPb,
    ];

    /// The ASCII prefix hashed in front of every input in this domain.
    pub const fn prefix(self) -> &'static [u8] {
        match self {
            Domain::PoswSeed => b"posw|seed|",
            Domain::PoswStep => b"posw|step|",
            Domain::MerkleLeaf => b"leaf|",
            Domain::MerkleNode => b"node|",
            Domain::Hashcash => b"hashcash|v3|",
            Domain::MhgPrf => b"MHG1-PRF",
            Domain::MhgKey => b"MHG1-KEY",
            Domain::MhgPa => b"MHG1-PA",
            Domain::MhgPb => b"MHG1-PB",
        }
    }
}

/// Compute `SHA-256(prefix(domain) || parts[0] || parts[1] || ...)`.
pub fn hash(domain: Domain, parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(domain.prefix());
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Big-endian 4-byte encoding used for every index embedded in a hash input.
pub const fn be32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Count leading zero bits, most-significant bit first, across the whole slice.
pub fn leading_zero_bits(data: &[u8]) -> u32 {
    let mut count = 0u32;
    for byte in data {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_prefixes_are_distinct() {
        for (i, a) in Domain::ALL.iter().enumerate() {
            for b in Domain::ALL.iter().skip(i + 1) {
                assert_ne!(a.prefix(), b.prefix(), "{a:?} and {b:?} share a prefix");
            }
        }
    }

    #[test]
    fn test_prefixes_are_ascii() {
        for domain in Domain::ALL {
            assert!(domain.prefix().is_ascii());
        }
    }

    #[test]
    fn test_hash_is_plain_sha256_over_prefix_and_parts() {
        let out = hash(Domain::MerkleNode, &[b"left", b"right"]);
        let expected: [u8; 32] = Sha256::digest(b"node|leftright").into();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_hash_known_vector() {
        // SHA-256("leaf|abc")
        let out = hash(Domain::MerkleLeaf, &[b"abc"]);
        assert_eq!(
            out,
            hex!("8e3528071e7445a25e785b21789f0110a9bdaae06249cf914b175dbc487771b3")
        );
    }

    #[test]
    fn test_domains_separate_identical_parts() {
        let a = hash(Domain::MhgPa, &[b"seed", b"nonce"]);
        let b = hash(Domain::MhgPb, &[b"seed", b"nonce"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_be32_is_big_endian() {
        assert_eq!(be32(1), [0, 0, 0, 1]);
        assert_eq!(be32(0x0102_0304), [1, 2, 3, 4]);
    }

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0xff]), 0);
        assert_eq!(leading_zero_bits(&[0x01]), 7);
        assert_eq!(leading_zero_bits(&[0x00, 0x80]), 8);
        assert_eq!(leading_zero_bits(&[0x00, 0x00, 0x10]), 19);
        assert_eq!(leading_zero_bits(&[0x00; 32]), 256);
        assert_eq!(leading_zero_bits(&[]), 0);
    }
}
