//! Scalar overlap kernel, the reference every other kernel must match.

use crate::geometry::Bbox;
use crate::overlap::{OverlapKernel, OverlapMetric};
use crate::util::math::guarded_div;

/// Overlap for one pair given precomputed areas.
///
/// The operation order here is mirrored lane-for-lane by the SIMD kernel.
#[inline]
pub(crate) fn overlap_pair(metric: OverlapMetric, a: &Bbox, a_area: f32, b: &Bbox, b_area: f32) -> f32 {
    let inter = a.intersection(b);
    match metric {
        OverlapMetric::Iou => guarded_div(inter, a_area + b_area - inter),
        OverlapMetric::Containment => guarded_div(inter, a_area),
    }
}

/// Reference boxes with their areas computed once.
pub struct ScalarPlan {
    boxes: Vec<Bbox>,
    areas: Vec<f32>,
}

impl ScalarPlan {
    pub fn new(reference: &[Bbox]) -> Self {
        Self {
            boxes: reference.to_vec(),
            areas: reference.iter().map(Bbox::area).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Fills a row-major `[rows.len(), plan.len()]` block.
pub(crate) fn fill_block(metric: OverlapMetric, rows: &[Bbox], plan: &ScalarPlan, out: &mut [f32]) {
    let cols = plan.len();
    debug_assert_eq!(out.len(), rows.len() * cols);
    if cols == 0 {
        return;
    }
    for (a, dst) in rows.iter().zip(out.chunks_exact_mut(cols)) {
        let a_area = a.area();
        for ((b, &b_area), v) in plan.boxes.iter().zip(plan.areas.iter()).zip(dst.iter_mut()) {
            *v = overlap_pair(metric, a, a_area, b, b_area);
        }
    }
}

/// Baseline per-row maximum kernel.
pub struct ScalarKernel;

impl OverlapKernel for ScalarKernel {
    type Plan = ScalarPlan;

    fn plan(reference: &[Bbox]) -> Self::Plan {
        ScalarPlan::new(reference)
    }

    fn row_max(metric: OverlapMetric, rows: &[Bbox], plan: &Self::Plan, out: &mut [f32]) {
        debug_assert_eq!(rows.len(), out.len());
        for (a, dst) in rows.iter().zip(out.iter_mut()) {
            let a_area = a.area();
            let mut best = 0.0f32;
            for (b, &b_area) in plan.boxes.iter().zip(plan.areas.iter()) {
                best = best.max(overlap_pair(metric, a, a_area, b, b_area));
            }
            *dst = best;
        }
    }
}
