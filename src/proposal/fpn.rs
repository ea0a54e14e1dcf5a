//! Proposal selection across feature-pyramid levels.

use super::{check_inputs, select_proposals, topk, ProposalConfig, ProposalSet};
use crate::filter::KeepMask;
use crate::geometry::{Bbox, ImageShape};
use crate::trace::{trace_event, trace_span};
use crate::util::{RpnError, RpnResult};

/// How pyramid levels are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FpnProposalMode {
    /// Select per level, concatenate, keep the best `per_level_topk` overall.
    #[default]
    Level,
    /// Concatenate every level and select once.
    Joint,
}

/// Multi-level selection settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpnProposalConfig {
    pub mode: FpnProposalMode,
    /// Pre- and post-NMS cap per level, and the final cap, in `Level` mode.
    pub per_level_topk: usize,
    /// Caps, minimum size and NMS threshold; the caps apply in `Joint` mode.
    pub proposals: ProposalConfig,
}

impl Default for FpnProposalConfig {
    fn default() -> Self {
        Self {
            mode: FpnProposalMode::Level,
            per_level_topk: 1000,
            proposals: ProposalConfig::default(),
        }
    }
}

impl FpnProposalConfig {
    pub fn validate(&self) -> RpnResult<()> {
        self.proposals.validate()
    }

    fn level_config(&self) -> ProposalConfig {
        ProposalConfig {
            pre_nms_topk: self.per_level_topk,
            post_nms_topk: self.per_level_topk,
            ..self.proposals
        }
    }
}

/// Decoded boxes and scores of one pyramid level.
#[derive(Clone, Copy, Debug)]
pub struct LevelProposalInput<'a> {
    pub boxes: &'a [Bbox],
    pub scores: &'a [f32],
}

impl<'a> LevelProposalInput<'a> {
    pub fn new(boxes: &'a [Bbox], scores: &'a [f32]) -> Self {
        Self { boxes, scores }
    }
}

/// Selects proposals over all pyramid levels.
///
/// `masks`, when given, holds one keep mask per level whose length matches
/// that level's box count.
pub fn select_fpn_proposals(
    levels: &[LevelProposalInput<'_>],
    image: ImageShape,
    cfg: &FpnProposalConfig,
    masks: Option<&[KeepMask]>,
) -> RpnResult<ProposalSet> {
    cfg.validate()?;
    if let Some(masks) = masks {
        if masks.len() != levels.len() {
            return Err(RpnError::ShapeMismatch {
                context: "keep masks per level",
                expected: levels.len(),
                got: masks.len(),
            });
        }
    }
    let level_mask = |idx: usize| masks.map(|m| m[idx].as_slice());
    for (idx, level) in levels.iter().enumerate() {
        check_inputs(level.boxes, level.scores, level_mask(idx))?;
    }

    let _span = trace_span!("select_fpn_proposals", levels = levels.len()).entered();
    let out = match cfg.mode {
        FpnProposalMode::Level => {
            let level_cfg = cfg.level_config();
            let mut merged = ProposalSet::default();
            for (idx, level) in levels.iter().enumerate() {
                let set =
                    select_proposals(level.boxes, level.scores, image, &level_cfg, level_mask(idx))?;
                trace_event!("level_proposals", level = idx, kept = set.len());
                merged.extend(set);
            }
            let mut order: Vec<usize> = (0..merged.len()).collect();
            topk::top_k_unsorted(&mut order, &merged.scores, cfg.per_level_topk);
            ProposalSet::gather(&merged.boxes, &merged.scores, &order)
        }
        FpnProposalMode::Joint => {
            let total: usize = levels.iter().map(|l| l.boxes.len()).sum();
            let mut boxes = Vec::with_capacity(total);
            let mut scores = Vec::with_capacity(total);
            let mut keep = Vec::with_capacity(if masks.is_some() { total } else { 0 });
            for (idx, level) in levels.iter().enumerate() {
                boxes.extend_from_slice(level.boxes);
                scores.extend_from_slice(level.scores);
                if let Some(mask) = level_mask(idx) {
                    keep.extend_from_slice(mask);
                }
            }
            let mask = masks.map(|_| keep.as_slice());
            select_proposals(&boxes, &scores, image, &cfg.proposals, mask)?
        }
    };
    trace_event!("fpn_proposals", kept = out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread_boxes(n: usize, offset: f32) -> Vec<Bbox> {
        (0..n)
            .map(|i| {
                let x = (i % 10) as f32 * 12.0 + offset;
                let y = (i / 10) as f32 * 12.0;
                Bbox::new(x, y, x + 8.0, y + 8.0)
            })
            .collect()
    }

    #[test]
    fn level_mode_caps_final_count() {
        let a = spread_boxes(30, 0.0);
        let b = spread_boxes(30, 4.0);
        let sa: Vec<f32> = (0..30).map(|i| i as f32).collect();
        let sb: Vec<f32> = (0..30).map(|i| i as f32 + 0.5).collect();
        let cfg = FpnProposalConfig {
            per_level_topk: 10,
            ..FpnProposalConfig::default()
        };
        let set = select_fpn_proposals(
            &[LevelProposalInput::new(&a, &sa), LevelProposalInput::new(&b, &sb)],
            ImageShape::new(500.0, 500.0),
            &cfg,
            None,
        )
        .unwrap();
        assert_eq!(set.len(), 10);
        assert!(set.scores.iter().all(|&s| s >= 24.0));
    }

    #[test]
    fn joint_mode_respects_global_caps() {
        let a = spread_boxes(20, 0.0);
        let sa = vec![1.0; 20];
        let cfg = FpnProposalConfig {
            mode: FpnProposalMode::Joint,
            per_level_topk: 1,
            proposals: ProposalConfig {
                pre_nms_topk: 15,
                post_nms_topk: 7,
                ..ProposalConfig::default()
            },
        };
        let set = select_fpn_proposals(
            &[LevelProposalInput::new(&a, &sa), LevelProposalInput::new(&[], &[])],
            ImageShape::new(500.0, 500.0),
            &cfg,
            None,
        )
        .unwrap();
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn mask_count_must_match_levels() {
        let a = spread_boxes(4, 0.0);
        let sa = vec![0.0; 4];
        let mask = KeepMask::from_vec(vec![true; 4], 2, 2, 1).unwrap();
        let err = select_fpn_proposals(
            &[LevelProposalInput::new(&a, &sa)],
            ImageShape::new(100.0, 100.0),
            &FpnProposalConfig::default(),
            Some(&[mask.clone(), mask]),
        )
        .unwrap_err();
        assert!(matches!(err, RpnError::ShapeMismatch { expected: 1, got: 2, .. }));
    }
}
