//! SIMD row-max kernel using the `wide` crate.
//!
//! Reference boxes are stored structure-of-arrays and processed eight at a
//! time with `f32x8`; the remainder falls back to the scalar pair function.
//! Lane arithmetic follows `scalar::overlap_pair` exactly so both kernels
//! agree exactly.

use crate::geometry::Bbox;
use crate::overlap::scalar::overlap_pair;
use crate::overlap::{OverlapKernel, OverlapMetric};
use wide::f32x8;

const LANES: usize = 8;

#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// Horizontal max of `num / den` seeded with `init`; lanes with `den <= 0`
/// count as 0.
#[inline]
fn guarded_hmax(num: f32x8, den: f32x8, init: f32) -> f32 {
    let q = (num / den).to_array();
    let d = den.to_array();
    q.iter()
        .zip(d.iter())
        .fold(init, |acc, (&q, &d)| if d > 0.0 { acc.max(q) } else { acc.max(0.0) })
}

/// Structure-of-arrays copy of the reference boxes.
pub struct SimdPlan {
    x1: Vec<f32>,
    y1: Vec<f32>,
    x2: Vec<f32>,
    y2: Vec<f32>,
    area: Vec<f32>,
    boxes: Vec<Bbox>,
}

impl SimdPlan {
    fn new(reference: &[Bbox]) -> Self {
        Self {
            x1: reference.iter().map(|b| b.x1).collect(),
            y1: reference.iter().map(|b| b.y1).collect(),
            x2: reference.iter().map(|b| b.x2).collect(),
            y2: reference.iter().map(|b| b.y2).collect(),
            area: reference.iter().map(Bbox::area).collect(),
            boxes: reference.to_vec(),
        }
    }
}

/// SIMD-accelerated per-row maximum kernel.
pub struct SimdKernel;

impl SimdKernel {
    fn row_max_one(metric: OverlapMetric, a: &Bbox, plan: &SimdPlan) -> f32 {
        let n = plan.boxes.len();
        let simd_end = n / LANES * LANES;

        let ax1 = f32x8::splat(a.x1);
        let ay1 = f32x8::splat(a.y1);
        let ax2 = f32x8::splat(a.x2);
        let ay2 = f32x8::splat(a.y2);
        let a_area = a.area();
        let a_area_v = f32x8::splat(a_area);

        let mut best = 0.0f32;
        let mut j = 0;
        while j < simd_end {
            let iw = ax2.min(load_f32x8(&plan.x2[j..])) - ax1.max(load_f32x8(&plan.x1[j..]));
            let ih = ay2.min(load_f32x8(&plan.y2[j..])) - ay1.max(load_f32x8(&plan.y1[j..]));
            let inter = iw.max(f32x8::ZERO) * ih.max(f32x8::ZERO);
            let den = match metric {
                OverlapMetric::Iou => a_area_v + load_f32x8(&plan.area[j..]) - inter,
                OverlapMetric::Containment => a_area_v,
            };
            best = guarded_hmax(inter, den, best);
            j += LANES;
        }

        while j < n {
            best = best.max(overlap_pair(metric, a, a_area, &plan.boxes[j], plan.area[j]));
            j += 1;
        }
        best
    }
}

impl OverlapKernel for SimdKernel {
    type Plan = SimdPlan;

    fn plan(reference: &[Bbox]) -> Self::Plan {
        SimdPlan::new(reference)
    }

    fn row_max(metric: OverlapMetric, rows: &[Bbox], plan: &Self::Plan, out: &mut [f32]) {
        debug_assert_eq!(rows.len(), out.len());
        for (a, dst) in rows.iter().zip(out.iter_mut()) {
            *dst = Self::row_max_one(metric, a, plan);
        }
    }
}
