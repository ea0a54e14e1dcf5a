//! Two-stage nested proposal pipeline.
//!
//! The first stage proposes parent (house) boxes from its own predictions.
//! The second stage builds containment masks of every anchor against those
//! parents and proposes child (damage) boxes only from anchors that lie
//! inside some parent.

mod head;

pub use head::RpnHead;

use crate::anchors::{AnchorGenerator, FpnAnchorConfig, FpnAnchors};
use crate::codec::{BoxCodec, BoxDelta};
use crate::filter::{filter_by_containment, ContainmentFilterConfig, KeepMask};
use crate::geometry::{Bbox, ImageShape};
use crate::proposal::{select_fpn_proposals, FpnProposalConfig, LevelProposalInput, ProposalSet};
use crate::trace::{trace_event, trace_span};
use crate::util::math::checked_volume;
use crate::util::{RpnError, RpnResult};

/// Head outputs for one pyramid level, laid out `[feature_h][feature_w][A]`.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelPrediction {
    pub feature_h: usize,
    pub feature_w: usize,
    /// Objectness logit per anchor.
    pub label_logits: Vec<f32>,
    /// Regression delta per anchor.
    pub box_deltas: Vec<BoxDelta>,
}

impl LevelPrediction {
    /// Checks both buffers against `feature_h * feature_w * num_anchors`.
    pub fn validate(&self, num_anchors: usize) -> RpnResult<()> {
        let expected = checked_volume(&[self.feature_h, self.feature_w, num_anchors])
            .ok_or(RpnError::InvalidInput("feature shape overflows usize"))?;
        if self.label_logits.len() != expected {
            return Err(RpnError::ShapeMismatch {
                context: "label logits per level",
                expected,
                got: self.label_logits.len(),
            });
        }
        if self.box_deltas.len() != expected {
            return Err(RpnError::ShapeMismatch {
                context: "box deltas per level",
                expected,
                got: self.box_deltas.len(),
            });
        }
        Ok(())
    }
}

/// Configuration shared by both stages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RpnConfig {
    pub head: RpnHead,
    pub anchors: FpnAnchorConfig,
    pub codec: BoxCodec,
    pub proposals: FpnProposalConfig,
    pub filter: ContainmentFilterConfig,
}

impl RpnConfig {
    pub fn validate(&self) -> RpnResult<()> {
        self.anchors.validate()?;
        self.codec.validate()?;
        self.proposals.validate()?;
        self.filter.validate()
    }
}

/// Proposals of both stages for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NestedProposals {
    pub house: ProposalSet,
    pub damage: ProposalSet,
}

/// House-then-damage proposal generator.
#[derive(Clone)]
pub struct HierarchicalRpn {
    generator: AnchorGenerator,
    cfg: RpnConfig,
}

impl HierarchicalRpn {
    /// Validates `cfg` and binds it to `generator`.
    pub fn new(generator: AnchorGenerator, cfg: RpnConfig) -> RpnResult<Self> {
        cfg.validate()?;
        Ok(Self { generator, cfg })
    }

    pub fn config(&self) -> &RpnConfig {
        &self.cfg
    }

    pub fn generator(&self) -> &AnchorGenerator {
        &self.generator
    }

    /// Full-field anchors of every level (cached by the generator).
    pub fn anchors(&self) -> RpnResult<FpnAnchors> {
        self.generator.generate_fpn(&self.cfg.anchors)
    }

    /// Proposes boxes from `levels` without any mask (first stage).
    pub fn propose(&self, levels: &[LevelPrediction], image: ImageShape) -> RpnResult<ProposalSet> {
        let _span = trace_span!("propose", levels = levels.len()).entered();
        let anchors = self.anchors()?;
        let decoded = self.decode_levels(&anchors, levels)?;
        self.select(&decoded, levels, image, None)
    }

    /// Proposes boxes restricted to anchors contained in `parents`
    /// (second stage).
    pub fn propose_within(
        &self,
        parents: &[Bbox],
        levels: &[LevelPrediction],
        image: ImageShape,
    ) -> RpnResult<ProposalSet> {
        let _span = trace_span!(
            "propose_within",
            parents = parents.len(),
            levels = levels.len()
        )
        .entered();
        let anchors = self.anchors()?;
        let decoded = self.decode_levels(&anchors, levels)?;
        let masks = filter_by_containment(parents, anchors.levels(), &self.cfg.filter)?
            .iter()
            .zip(levels)
            .map(|(mask, level)| mask.narrow_to(level.feature_h, level.feature_w))
            .collect::<RpnResult<Vec<KeepMask>>>()?;
        self.select(&decoded, levels, image, Some(&masks))
    }

    /// Runs both stages; damage proposals are nested in house proposals.
    pub fn run(
        &self,
        house_levels: &[LevelPrediction],
        damage_levels: &[LevelPrediction],
        image: ImageShape,
    ) -> RpnResult<NestedProposals> {
        let house = self.propose(house_levels, image)?;
        trace_event!("house_proposals", kept = house.len());
        let damage = self.propose_within(&house.boxes, damage_levels, image)?;
        trace_event!("damage_proposals", kept = damage.len());
        Ok(NestedProposals { house, damage })
    }

    fn decode_levels(
        &self,
        anchors: &FpnAnchors,
        levels: &[LevelPrediction],
    ) -> RpnResult<Vec<Vec<Bbox>>> {
        if levels.len() != anchors.len() {
            return Err(RpnError::ShapeMismatch {
                context: "prediction levels",
                expected: anchors.len(),
                got: levels.len(),
            });
        }
        anchors
            .iter()
            .zip(levels)
            .map(|(grid, level)| {
                check_feature_fits(grid.field_h(), level.feature_h, "feature height per level")?;
                check_feature_fits(grid.field_w(), level.feature_w, "feature width per level")?;
                level.validate(grid.num_anchors())?;
                self.cfg
                    .codec
                    .decode_level(grid, level.feature_h, level.feature_w, &level.box_deltas)
            })
            .collect()
    }

    fn select(
        &self,
        decoded: &[Vec<Bbox>],
        levels: &[LevelPrediction],
        image: ImageShape,
        masks: Option<&[KeepMask]>,
    ) -> RpnResult<ProposalSet> {
        let inputs: Vec<LevelProposalInput<'_>> = decoded
            .iter()
            .zip(levels)
            .map(|(boxes, level)| LevelProposalInput::new(boxes, &level.label_logits))
            .collect();
        select_fpn_proposals(&inputs, image, &self.cfg.proposals, masks)
    }
}

fn check_feature_fits(field: usize, feature: usize, context: &'static str) -> RpnResult<()> {
    if feature > field {
        return Err(RpnError::ShapeMismatch {
            context,
            expected: field,
            got: feature,
        });
    }
    Ok(())
}
