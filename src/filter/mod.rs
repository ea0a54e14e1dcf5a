//! Containment filtering of anchors against parent boxes.
//!
//! The second (damage) stage only considers anchors that lie mostly inside
//! some first-stage (house) box. For each pyramid level the filter reduces
//! every anchor to its best overlap against all parents and keeps it when
//! that overlap is strictly above the threshold.

use crate::anchors::AnchorGrid;
use crate::geometry::Bbox;
use crate::overlap::{max_overlap_per_row, OverlapMetric, OverlapParams};
use crate::trace::{trace_event, trace_span};
use crate::util::math::checked_volume;
use crate::util::{RpnError, RpnResult};

/// Threshold used by the damage stage.
pub const DEFAULT_CONTAINMENT_THRESHOLD: f32 = 0.3;

/// Containment filter configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainmentFilterConfig {
    /// Anchors are kept when their best overlap is `> threshold`.
    pub threshold: f32,
    pub metric: OverlapMetric,
    pub overlap: OverlapParams,
}

impl Default for ContainmentFilterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONTAINMENT_THRESHOLD,
            metric: OverlapMetric::Containment,
            overlap: OverlapParams::default(),
        }
    }
}

impl ContainmentFilterConfig {
    /// The threshold must be finite and non-negative.
    pub fn validate(&self) -> RpnResult<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(RpnError::InvalidConfig {
                reason: "containment threshold must be finite and >= 0",
            });
        }
        self.overlap.validate()
    }
}

/// Per-anchor keep flags shaped `[field_h, field_w, A]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeepMask {
    data: Vec<bool>,
    field_h: usize,
    field_w: usize,
    num_anchors: usize,
}

impl KeepMask {
    /// Wraps flat flags; the length must match the shape.
    pub fn from_vec(
        data: Vec<bool>,
        field_h: usize,
        field_w: usize,
        num_anchors: usize,
    ) -> RpnResult<Self> {
        let expected = checked_volume(&[field_h, field_w, num_anchors])
            .ok_or(RpnError::InvalidInput("keep mask shape overflows usize"))?;
        if data.len() != expected {
            return Err(RpnError::ShapeMismatch {
                context: "keep mask",
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            field_h,
            field_w,
            num_anchors,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.field_h, self.field_w, self.num_anchors]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of kept anchors.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&k| k).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    pub fn get(&self, y: usize, x: usize, a: usize) -> Option<bool> {
        if y >= self.field_h || x >= self.field_w || a >= self.num_anchors {
            return None;
        }
        self.data
            .get((y * self.field_w + x) * self.num_anchors + a)
            .copied()
    }

    /// Crops the mask to the `[0:fh, 0:fw]` region of a narrowed grid.
    pub fn narrow_to(&self, fh: usize, fw: usize) -> RpnResult<KeepMask> {
        if fh > self.field_h || fw > self.field_w {
            return Err(RpnError::ShapeMismatch {
                context: "narrowed keep mask cells",
                expected: self.field_h * self.field_w,
                got: fh * fw,
            });
        }
        let row_len = fw * self.num_anchors;
        let data = (0..fh)
            .flat_map(|y| {
                let start = y * self.field_w * self.num_anchors;
                self.data[start..start + row_len].iter().copied()
            })
            .collect();
        Ok(KeepMask {
            data,
            field_h: fh,
            field_w: fw,
            num_anchors: self.num_anchors,
        })
    }
}

/// Flat keep flags: `anchors[i]` is kept iff its best overlap against
/// `parents` is `> cfg.threshold`. No parents keeps nothing.
pub fn containment_keep_flags(
    parents: &[Bbox],
    anchors: &[Bbox],
    cfg: &ContainmentFilterConfig,
) -> RpnResult<Vec<bool>> {
    cfg.validate()?;
    if parents.is_empty() {
        return Ok(vec![false; anchors.len()]);
    }
    let best = max_overlap_per_row(anchors, parents, cfg.metric, cfg.overlap)?;
    Ok(best.into_iter().map(|v| v > cfg.threshold).collect())
}

/// Builds one keep mask per anchor grid, in input order.
pub fn filter_by_containment<G>(
    parents: &[Bbox],
    levels: &[G],
    cfg: &ContainmentFilterConfig,
) -> RpnResult<Vec<KeepMask>>
where
    G: AsRef<AnchorGrid>,
{
    cfg.validate()?;
    let _span = trace_span!(
        "filter_by_containment",
        parents = parents.len(),
        levels = levels.len()
    )
    .entered();

    levels
        .iter()
        .map(|grid| {
            let grid = grid.as_ref();
            let flags = containment_keep_flags(parents, grid.as_slice(), cfg)?;
            let mask =
                KeepMask::from_vec(flags, grid.field_h(), grid.field_w(), grid.num_anchors())?;
            trace_event!(
                "containment_level",
                stride = grid.stride(),
                anchors = mask.len(),
                kept = mask.count()
            );
            Ok(mask)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::{generate_anchors, AnchorSpec};
    use std::sync::Arc;

    #[test]
    fn no_parents_keeps_nothing() {
        let spec = AnchorSpec::new(8, vec![8.0], vec![1.0], 32);
        let grid = Arc::new(generate_anchors(&spec).unwrap());
        let masks =
            filter_by_containment(&[], &[grid], &ContainmentFilterConfig::default()).unwrap();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].shape(), [4, 4, 1]);
        assert_eq!(masks[0].count(), 0);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let cfg = ContainmentFilterConfig {
            threshold: -0.5,
            ..ContainmentFilterConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RpnError::InvalidConfig { .. })));
        let anchors = [Bbox::new(0.0, 0.0, 4.0, 4.0); 3];
        assert!(containment_keep_flags(&[], &anchors, &cfg).is_err());
    }

    #[test]
    fn zero_threshold_without_parents_keeps_nothing() {
        let cfg = ContainmentFilterConfig {
            threshold: 0.0,
            ..ContainmentFilterConfig::default()
        };
        let anchors = [Bbox::new(0.0, 0.0, 4.0, 4.0); 3];
        assert_eq!(containment_keep_flags(&[], &anchors, &cfg).unwrap(), vec![false; 3]);
    }

    #[test]
    fn keep_is_strictly_above_threshold() {
        let anchors = [Bbox::new(0.0, 0.0, 10.0, 10.0)];
        // exactly 30% of the anchor lies inside the parent
        let parents = [Bbox::new(7.0, 0.0, 20.0, 10.0)];
        let cfg = ContainmentFilterConfig::default();
        assert_eq!(containment_keep_flags(&parents, &anchors, &cfg).unwrap(), vec![false]);
        let cfg = ContainmentFilterConfig {
            threshold: 0.29,
            ..cfg
        };
        assert_eq!(containment_keep_flags(&parents, &anchors, &cfg).unwrap(), vec![true]);
    }

    #[test]
    fn mask_narrowing_matches_grid_narrowing() {
        let mask = KeepMask::from_vec((0..18).map(|i| i % 3 == 0).collect(), 3, 3, 2).unwrap();
        let narrow = mask.narrow_to(2, 1).unwrap();
        assert_eq!(narrow.shape(), [2, 1, 2]);
        assert_eq!(narrow.as_slice(), &[true, false, true, false]);
        assert!(mask.narrow_to(4, 1).is_err());
    }

    #[test]
    fn mismatched_mask_length_is_rejected() {
        assert!(KeepMask::from_vec(vec![true; 5], 2, 2, 1).is_err());
    }

    #[test]
    fn overflowing_mask_shape_is_an_error() {
        let err = KeepMask::from_vec(vec![true; 4], 1 << 33, 1 << 31, 1).unwrap_err();
        assert!(matches!(err, RpnError::InvalidInput(_)));
    }
}
