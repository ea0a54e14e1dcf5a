//! Region-proposal selection.
//!
//! Decoded boxes and their objectness logits are reduced to a bounded set
//! of proposals: optional mask, top-k by score, clip to the image, minimum
//! size filter, then greedy NMS. [`select_fpn_proposals`] combines the
//! per-level results of a feature pyramid.

mod fpn;
pub(crate) mod nms;
pub(crate) mod topk;

pub use fpn::{select_fpn_proposals, FpnProposalConfig, FpnProposalMode, LevelProposalInput};

use crate::geometry::{Bbox, ImageShape};
use crate::trace::{trace_event, trace_span};
use crate::util::{RpnError, RpnResult};

/// Selection limits and thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProposalConfig {
    /// Candidates kept by score before NMS.
    pub pre_nms_topk: usize,
    /// Maximum number of NMS survivors.
    pub post_nms_topk: usize,
    /// Boxes whose width or height is `<= min_size` are dropped; 0 disables.
    pub min_size: f32,
    /// Boxes with IoU `> nms_iou` against a better survivor are suppressed.
    pub nms_iou: f32,
}

impl Default for ProposalConfig {
    /// Test-time RPN settings.
    fn default() -> Self {
        Self {
            pre_nms_topk: 6000,
            post_nms_topk: 1000,
            min_size: 0.0,
            nms_iou: 0.7,
        }
    }
}

impl ProposalConfig {
    pub fn validate(&self) -> RpnResult<()> {
        if !(self.min_size.is_finite() && self.min_size >= 0.0) {
            return Err(RpnError::InvalidConfig {
                reason: "min_size must be finite and >= 0",
            });
        }
        if !self.nms_iou.is_finite() {
            return Err(RpnError::InvalidConfig {
                reason: "nms_iou must be finite",
            });
        }
        Ok(())
    }
}

/// Selected proposals with their original scores.
///
/// Entries are in NMS survivor order. Callers must not rely on that order
/// being score-sorted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProposalSet {
    pub boxes: Vec<Bbox>,
    pub scores: Vec<f32>,
}

impl ProposalSet {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Iterates `(box, score)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Bbox, f32)> + '_ {
        self.boxes.iter().zip(self.scores.iter().copied())
    }

    pub(crate) fn gather(boxes: &[Bbox], scores: &[f32], indices: &[usize]) -> Self {
        Self {
            boxes: indices.iter().map(|&i| boxes[i]).collect(),
            scores: indices.iter().map(|&i| scores[i]).collect(),
        }
    }

    pub(crate) fn extend(&mut self, other: ProposalSet) {
        self.boxes.extend(other.boxes);
        self.scores.extend(other.scores);
    }
}

pub(crate) fn check_inputs(
    boxes: &[Bbox],
    scores: &[f32],
    mask: Option<&[bool]>,
) -> RpnResult<()> {
    if scores.len() != boxes.len() {
        return Err(RpnError::ShapeMismatch {
            context: "scores per box",
            expected: boxes.len(),
            got: scores.len(),
        });
    }
    if let Some(mask) = mask {
        if mask.len() != boxes.len() {
            return Err(RpnError::ShapeMismatch {
                context: "mask entries per box",
                expected: boxes.len(),
                got: mask.len(),
            });
        }
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(RpnError::InvalidInput("scores must not be NaN"));
    }
    Ok(())
}

/// Selects proposals from one set of decoded boxes.
///
/// 1. `mask` (if given) restricts the candidates.
/// 2. The top `min(pre_nms_topk, N)` candidates by score are kept.
/// 3. Boxes are clipped to `[0, 0, width, height]`.
/// 4. With `min_size > 0`, boxes whose width or height is `<= min_size` go.
/// 5. Greedy NMS keeps at most `post_nms_topk` survivors.
///
/// Inputs are not modified; an empty input yields an empty set.
pub fn select_proposals(
    boxes: &[Bbox],
    scores: &[f32],
    image: ImageShape,
    cfg: &ProposalConfig,
    mask: Option<&[bool]>,
) -> RpnResult<ProposalSet> {
    cfg.validate()?;
    image.validate()?;
    check_inputs(boxes, scores, mask)?;
    let _span = trace_span!("select_proposals", candidates = boxes.len()).entered();

    let mut candidates: Vec<usize> = match mask {
        Some(mask) => (0..boxes.len()).filter(|&i| mask[i]).collect(),
        None => (0..boxes.len()).collect(),
    };
    topk::top_k_unsorted(&mut candidates, scores, cfg.pre_nms_topk);

    let min = cfg.min_size;
    let (top_boxes, top_scores): (Vec<Bbox>, Vec<f32>) = candidates
        .iter()
        .map(|&i| (boxes[i].clip(image), scores[i]))
        .filter(|(b, _)| min <= 0.0 || (b.width() > min && b.height() > min))
        .unzip();

    let mut order: Vec<usize> = (0..top_boxes.len()).collect();
    let kept = nms::greedy_nms(
        &top_boxes,
        &top_scores,
        &mut order,
        cfg.nms_iou,
        cfg.post_nms_topk,
    );
    trace_event!("proposals_selected", kept = kept.len());
    Ok(ProposalSet::gather(&top_boxes, &top_scores, &kept))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageShape {
        ImageShape::new(100.0, 100.0)
    }

    #[test]
    fn empty_input_gives_empty_set() {
        let set = select_proposals(&[], &[], image(), &ProposalConfig::default(), None).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn nan_score_is_rejected() {
        let boxes = [Bbox::new(0.0, 0.0, 4.0, 4.0)];
        let err =
            select_proposals(&boxes, &[f32::NAN], image(), &ProposalConfig::default(), None)
                .unwrap_err();
        assert_eq!(err, RpnError::InvalidInput("scores must not be NaN"));
    }

    #[test]
    fn mask_and_score_lengths_are_checked() {
        let boxes = [Bbox::new(0.0, 0.0, 4.0, 4.0); 3];
        let cfg = ProposalConfig::default();
        assert!(select_proposals(&boxes, &[0.0; 2], image(), &cfg, None).is_err());
        assert!(select_proposals(&boxes, &[0.0; 3], image(), &cfg, Some(&[true; 4])).is_err());
    }

    #[test]
    fn min_size_drops_thin_boxes_after_clipping() {
        let boxes = [
            Bbox::new(0.0, 0.0, 20.0, 20.0),
            // only 2px tall once clipped to the image
            Bbox::new(10.0, 98.0, 40.0, 140.0),
        ];
        let cfg = ProposalConfig {
            min_size: 2.0,
            ..ProposalConfig::default()
        };
        let set = select_proposals(&boxes, &[0.1, 0.9], image(), &cfg, None).unwrap();
        assert_eq!(set.boxes, vec![boxes[0]]);
        assert_eq!(set.scores, vec![0.1]);
    }

    #[test]
    fn masked_entries_never_survive() {
        let boxes = [
            Bbox::new(0.0, 0.0, 10.0, 10.0),
            Bbox::new(50.0, 50.0, 60.0, 60.0),
        ];
        let set = select_proposals(
            &boxes,
            &[5.0, 1.0],
            image(),
            &ProposalConfig::default(),
            Some(&[false, true]),
        )
        .unwrap();
        assert_eq!(set.boxes, vec![boxes[1]]);
    }
}
