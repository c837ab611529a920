//! Conversions between in-memory proofs and their base64url wire shapes.
//!
//! Encoding is infallible. Decoding untrusted input reports every defect as
//! [`VerifyFailure::Malformed`].

use tollgate_crypto::encoding::{b64u_decode, b64u_encode, decode_digest};
use tollgate_types::wire::{WireCommit, WireMhgOpening, WireMhgProofs, WireOpenEntry, WireProof};

use crate::merkle::MerkleProof;
use crate::mhg::MhgOpening;
use crate::open::{MidOpening, OpenEntry};
use crate::posw::Commitment;
use crate::{Digest, PowError, Result, VerifyFailure};

fn malformed(msg: impl Into<String>) -> PowError {
    VerifyFailure::Malformed(msg.into()).into()
}

fn digest(field: &str, text: &str) -> Result<Digest> {
    decode_digest(text).map_err(|e| malformed(format!("{field}: {e}")))
}

fn bytes(field: &str, text: &str) -> Result<Vec<u8>> {
    b64u_decode(text).map_err(|e| malformed(format!("{field}: {e}")))
}

impl From<&Commitment> for WireCommit {
    fn from(commitment: &Commitment) -> Self {
        Self {
            root_b64: commitment.root_b64(),
            nonce: commitment.nonce.clone(),
        }
    }
}

impl From<&MerkleProof> for WireProof {
    fn from(proof: &MerkleProof) -> Self {
        Self {
            sibs: proof.siblings.iter().map(|s| b64u_encode(s)).collect(),
            dirs: proof.dirs.iter().map(|&d| if d { '1' } else { '0' }).collect(),
        }
    }
}

impl TryFrom<&WireProof> for MerkleProof {
    type Error = PowError;

    fn try_from(wire: &WireProof) -> Result<Self> {
        let dirs = wire
            .dirs
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(malformed(format!("direction {other:?}"))),
            })
            .collect::<Result<Vec<_>>>()?;
        if dirs.len() != wire.sibs.len() {
            return Err(malformed(format!(
                "{} siblings with {} directions",
                wire.sibs.len(),
                dirs.len()
            )));
        }
        let siblings = wire
            .sibs
            .iter()
            .map(|s| digest("sibling", s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { siblings, dirs })
    }
}

impl From<&OpenEntry> for WireOpenEntry {
    fn from(entry: &OpenEntry) -> Self {
        Self {
            i: entry.i,
            prev: entry.prev,
            h_prev: b64u_encode(&entry.h_prev),
            h_curr: b64u_encode(&entry.h_curr),
            proof_prev: (&entry.proof_prev).into(),
            proof_curr: (&entry.proof_curr).into(),
            mid: entry.mid.as_ref().map(|m| m.index),
            h_mid: entry.mid.as_ref().map(|m| b64u_encode(&m.value)),
            proof_mid: entry.mid.as_ref().map(|m| (&m.proof).into()),
        }
    }
}

impl TryFrom<&WireOpenEntry> for OpenEntry {
    type Error = PowError;

    fn try_from(wire: &WireOpenEntry) -> Result<Self> {
        let mid = match (wire.mid, &wire.h_mid, &wire.proof_mid) {
            (None, None, None) => None,
            (Some(index), Some(value), Some(proof)) => Some(MidOpening {
                index,
                value: digest("hMid", value)?,
                proof: proof.try_into()?,
            }),
            _ => return Err(malformed("partial midpoint")),
        };
        Ok(Self {
            i: wire.i,
            prev: wire.prev,
            h_prev: digest("hPrev", &wire.h_prev)?,
            h_curr: digest("hCurr", &wire.h_curr)?,
            proof_prev: (&wire.proof_prev).try_into()?,
            proof_curr: (&wire.proof_curr).try_into()?,
            mid,
        })
    }
}

impl From<&MhgOpening> for WireMhgOpening {
    fn from(open: &MhgOpening) -> Self {
        Self {
            i: open.i,
            page: b64u_encode(&open.page),
            p0: b64u_encode(&open.p0),
            p1: b64u_encode(&open.p1),
            p2: b64u_encode(&open.p2),
            proof: WireMhgProofs {
                page: (&open.proof_page).into(),
                p0: (&open.proof_p0).into(),
                p1: (&open.proof_p1).into(),
                p2: (&open.proof_p2).into(),
            },
        }
    }
}

impl TryFrom<&WireMhgOpening> for MhgOpening {
    type Error = PowError;

    fn try_from(wire: &WireMhgOpening) -> Result<Self> {
        Ok(Self {
            i: wire.i,
            page: bytes("page", &wire.page)?,
            p0: bytes("p0", &wire.p0)?,
            p1: bytes("p1", &wire.p1)?,
            p2: bytes("p2", &wire.p2)?,
            proof_page: (&wire.proof.page).try_into()?,
            proof_p0: (&wire.proof.p0).try_into()?,
            proof_p1: (&wire.proof.p1).try_into()?,
            proof_p2: (&wire.proof.p2).try_into()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Control;
    use crate::mhg::{MhgParams, MhgProver};
    use crate::open::OpenRequest;
    use crate::posw::{PoswContext, PoswParams};

    fn reason(err: PowError) -> &'static str {
        err.reason()
    }

    #[test]
    fn test_proof_wire_shape() {
        let proof = MerkleProof {
            siblings: vec![[0u8; 32], [0xFF; 32]],
            dirs: vec![true, false],
        };
        let wire = WireProof::from(&proof);
        assert_eq!(wire.dirs, "10");
        assert_eq!(wire.sibs[0], "A".repeat(43));
        assert_eq!(MerkleProof::try_from(&wire).expect("decode"), proof);
    }

    #[test]
    fn test_bad_proofs_are_malformed() {
        let good = WireProof {
            sibs: vec!["A".repeat(43)],
            dirs: "0".to_string(),
        };
        let mut bad_dir = good.clone();
        bad_dir.dirs = "2".to_string();
        assert_eq!(reason(MerkleProof::try_from(&bad_dir).expect_err("dir")), "malformed");

        let mut short = good.clone();
        short.dirs = String::new();
        assert_eq!(reason(MerkleProof::try_from(&short).expect_err("len")), "malformed");

        let mut bad_sib = good;
        bad_sib.sibs[0] = "AAAA".to_string();
        assert_eq!(reason(MerkleProof::try_from(&bad_sib).expect_err("sib")), "malformed");
    }

    #[test]
    fn test_open_entry_through_json() {
        let params = PoswParams::new("wire", 16).expect("params").with_segment_len(4);
        let mut ctx = PoswContext::new(params).expect("context");
        ctx.commit(&Control::detached()).expect("commit");
        let request = OpenRequest::new([12, 5]).with_spine_pos([0]);
        let entries = ctx.open(&request, &Control::detached()).expect("open");

        let wire: Vec<WireOpenEntry> = entries.iter().map(WireOpenEntry::from).collect();
        let json = serde_json::to_string(&wire).expect("serialize");
        let back: Vec<WireOpenEntry> = serde_json::from_str(&json).expect("parse");
        let decoded = back
            .iter()
            .map(OpenEntry::try_from)
            .collect::<Result<Vec<_>>>()
            .expect("decode");
        assert_eq!(decoded, entries);
        assert_eq!(back[0].mid, Some(10));
        assert!(back[1].h_mid.is_none());
    }

    #[test]
    fn test_partial_midpoint_rejected() {
        let params = PoswParams::new("wire", 8).expect("params").with_segment_len(4);
        let mut ctx = PoswContext::new(params).expect("context");
        ctx.commit(&Control::detached()).expect("commit");
        let entries = ctx
            .open(&OpenRequest::new([8]).with_spine_pos([0]), &Control::detached())
            .expect("open");
        let mut wire = WireOpenEntry::from(&entries[0]);
        wire.h_mid = None;
        assert_eq!(reason(OpenEntry::try_from(&wire).expect_err("partial")), "malformed");
    }

    #[test]
    fn test_mhg_opening_through_wire() {
        let seed: Vec<u8> = (0..16).collect();
        let params = MhgParams::new(16).expect("params");
        let prover = MhgProver::build(&seed, b"n", params, &Control::detached()).expect("build");
        let opens = prover.open(&[9]).expect("open");
        let wire = WireMhgOpening::from(&opens[0]);
        assert_eq!(wire.page.len(), 86);
        assert_eq!(MhgOpening::try_from(&wire).expect("decode"), opens[0]);
    }

    #[test]
    fn test_commit_to_wire() {
        let commitment = Commitment {
            root: [0u8; 32],
            nonce: "abc".to_string(),
            attempts: 1,
        };
        let wire = WireCommit::from(&commitment);
        assert_eq!(wire.root_b64.len(), 43);
        assert_eq!(wire.nonce, "abc");
    }
}
