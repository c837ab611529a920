//! OPEN requests: validation, segment planning and the resulting entries.
//!
//! Opening index `i` with segment length `s` reveals the chain states at
//! `prev = i - min(s, i)` and `i`, so a verifier can walk the segment forward.
//! A spine position additionally reveals an interior midpoint.
//!
//! The prover and the verifier share [`plan`], so both sides agree on which
//! positions an accepted request covers.

use std::collections::HashSet;

use crate::merkle::MerkleProof;
use crate::{Digest, PowError, Result};

/// A validated-on-use OPEN request. Values are signed so that out-of-range
/// input from the host reaches validation instead of failing to parse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenRequest {
    /// Challenged chain indices, as sent.
    pub indices: Vec<i64>,
    /// Per-index segment lengths; same length as `indices` when present.
    pub seg_lens: Option<Vec<i64>>,
    /// Positions into `indices` that also open a midpoint.
    pub spine_pos: Option<Vec<i64>>,
}

impl OpenRequest {
    pub fn new(indices: impl IntoIterator<Item = i64>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_seg_lens(mut self, seg_lens: impl IntoIterator<Item = i64>) -> Self {
        self.seg_lens = Some(seg_lens.into_iter().collect());
        self
    }

    pub fn with_spine_pos(mut self, spine_pos: impl IntoIterator<Item = i64>) -> Self {
        self.spine_pos = Some(spine_pos.into_iter().collect());
        self
    }
}

/// The chain positions one requested index resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedOpen {
    /// Challenged chain index.
    pub i: u32,
    /// Segment start.
    pub prev: u32,
    /// Midpoint to open, if requested.
    pub mid: Option<u32>,
}

/// Midpoint of the segment ending at `idx`, or `None` when the effective
/// segment is too short to bisect.
pub fn mid_index(idx: u32, seg_len: u64) -> Option<u32> {
    let effective = seg_len.min(u64::from(idx));
    if effective <= 1 {
        return None;
    }
    let offset = (effective / 2).max(1);
    u32::try_from(u64::from(idx) - offset).ok()
}

fn invalid(msg: impl Into<String>) -> PowError {
    PowError::IndicesInvalid(msg.into())
}

/// Validate `request` against a chain of `steps` steps and resolve every
/// index to its segment endpoints.
pub fn plan(request: &OpenRequest, steps: u32, default_seg_len: u32) -> Result<Vec<PlannedOpen>> {
    if request.indices.is_empty() {
        return Err(invalid("indices required"));
    }
    let count = request.indices.len();
    if let Some(seg_lens) = &request.seg_lens {
        if seg_lens.len() != count {
            return Err(invalid(format!(
                "segLens has {} entries for {count} indices",
                seg_lens.len()
            )));
        }
    }

    let mut spine = HashSet::new();
    if let Some(spine_pos) = &request.spine_pos {
        for &pos in spine_pos {
            let in_range = usize::try_from(pos).is_ok_and(|p| p < count);
            if !in_range {
                return Err(invalid(format!("spine position {pos} out of range")));
            }
            if !spine.insert(pos) {
                return Err(invalid(format!("duplicate spine position {pos}")));
            }
        }
    }

    let mut seen = HashSet::with_capacity(count);
    let mut planned = Vec::with_capacity(count);
    for (pos, &raw) in request.indices.iter().enumerate() {
        let i = u32::try_from(raw)
            .ok()
            .filter(|i| (1..=steps).contains(i))
            .ok_or_else(|| invalid(format!("index {raw} outside 1..={steps}")))?;
        if !seen.insert(i) {
            return Err(invalid(format!("duplicate index {i}")));
        }

        let seg_len = match &request.seg_lens {
            Some(seg_lens) => seg_lens[pos],
            None => i64::from(default_seg_len),
        };
        let seg_len = u64::try_from(seg_len)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| invalid(format!("segment length {seg_len} must be positive")))?;

        let effective = seg_len.min(u64::from(i));
        // effective <= i, so the difference fits
        let prev = i - u32::try_from(effective).unwrap_or(i);

        let mid = if spine.contains(&(pos as i64)) {
            Some(mid_index(i, seg_len).ok_or_else(|| {
                invalid(format!("segment ending at {i} is too short for a midpoint"))
            })?)
        } else {
            None
        };

        planned.push(PlannedOpen { i, prev, mid });
    }
    Ok(planned)
}

/// An opened interior chain state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidOpening {
    /// Chain index of the midpoint.
    pub index: u32,
    /// Chain state at `index`.
    pub value: Digest,
    /// Inclusion proof for the midpoint leaf.
    pub proof: MerkleProof,
}

/// One opened segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenEntry {
    /// Challenged chain index.
    pub i: u32,
    /// Segment start, `i - min(segLen, i)`.
    pub prev: u32,
    /// Chain state at `prev`.
    pub h_prev: Digest,
    /// Chain state at `i`.
    pub h_curr: Digest,
    /// Inclusion proof for the `prev` leaf.
    pub proof_prev: MerkleProof,
    /// Inclusion proof for the `i` leaf.
    pub proof_curr: MerkleProof,
    /// Midpoint, present when its position was in `spinePos`.
    pub mid: Option<MidOpening>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<Vec<PlannedOpen>>) -> &'static str {
        match result {
            Ok(_) => "ok",
            Err(e) => e.reason(),
        }
    }

    #[test]
    fn test_mid_index() {
        assert_eq!(mid_index(1, 8), None);
        assert_eq!(mid_index(5, 1), None);
        assert_eq!(mid_index(2, 2), Some(1));
        assert_eq!(mid_index(10, 4), Some(8));
        assert_eq!(mid_index(10, 5), Some(8));
        assert_eq!(mid_index(3, 100), Some(2));
    }

    #[test]
    fn test_plan_default_segment() {
        let planned = plan(&OpenRequest::new([3, 1]), 4, 2).expect("plan");
        assert_eq!(
            planned,
            vec![
                PlannedOpen { i: 3, prev: 1, mid: None },
                PlannedOpen { i: 1, prev: 0, mid: None },
            ]
        );
    }

    #[test]
    fn test_plan_explicit_segments_and_spine() {
        let request = OpenRequest::new([2, 4])
            .with_seg_lens([2, 4])
            .with_spine_pos([1]);
        let planned = plan(&request, 4, 1).expect("plan");
        assert_eq!(planned[0], PlannedOpen { i: 2, prev: 0, mid: None });
        assert_eq!(planned[1], PlannedOpen { i: 4, prev: 0, mid: Some(2) });
    }

    #[test]
    fn test_plan_rejections() {
        assert_eq!(reason(plan(&OpenRequest::new([]), 4, 1)), "indices_invalid");
        assert_eq!(reason(plan(&OpenRequest::new([0]), 4, 1)), "indices_invalid");
        assert_eq!(reason(plan(&OpenRequest::new([5]), 4, 1)), "indices_invalid");
        assert_eq!(reason(plan(&OpenRequest::new([-1]), 4, 1)), "indices_invalid");
        assert_eq!(reason(plan(&OpenRequest::new([2, 2]), 4, 1)), "indices_invalid");
        assert_eq!(
            reason(plan(&OpenRequest::new([2, 3]).with_seg_lens([1]), 4, 1)),
            "indices_invalid"
        );
        assert_eq!(
            reason(plan(&OpenRequest::new([2]).with_seg_lens([0]), 4, 1)),
            "indices_invalid"
        );
        assert_eq!(
            reason(plan(&OpenRequest::new([2]).with_spine_pos([1]), 4, 2)),
            "indices_invalid"
        );
        assert_eq!(
            reason(plan(&OpenRequest::new([2, 3]).with_spine_pos([0, 0]), 4, 2)),
            "indices_invalid"
        );
        // segment of one step has no interior
        assert_eq!(
            reason(plan(&OpenRequest::new([3]).with_spine_pos([0]), 4, 1)),
            "indices_invalid"
        );
    }

    #[test]
    fn test_segment_clamped_to_index() {
        let planned = plan(&OpenRequest::new([2]).with_seg_lens([1000]), 4, 1).expect("plan");
        assert_eq!(planned[0].prev, 0);
    }
}
