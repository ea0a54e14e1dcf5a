//! Pairwise overlap between two box sets.
//!
//! Two metrics are supported: symmetric IoU and the asymmetric containment
//! ratio `intersection / area(a)`, which measures how much of an anchor lies
//! inside a parent box. Both define a zero denominator as an overlap of 0.
//!
//! Large query sets are processed in fixed-size row chunks so the full
//! `[N, M]` matrix never has to exist when only a per-row maximum is needed.
//! Chunking is a memory policy: every chunk size, kernel and the parallel
//! path produce the same numbers as the unchunked scalar evaluation.

use crate::geometry::Bbox;
use crate::trace::trace_span;
use crate::util::{RpnError, RpnResult};

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;

#[cfg(not(feature = "simd"))]
use self::scalar::ScalarKernel as RowMaxKernel;
#[cfg(feature = "simd")]
use self::simd::SimdKernel as RowMaxKernel;

/// Rows per chunk used when none is configured (one 21x21 field with 3
/// anchors per cell).
pub const DEFAULT_CHUNK_ROWS: usize = 21 * 21 * 3;

/// Overlap metric between a query box `a` and a reference box `b`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OverlapMetric {
    /// Intersection over union.
    Iou,
    /// Intersection over the area of the query box.
    #[default]
    Containment,
}

impl OverlapMetric {
    /// Evaluates the metric for a single pair.
    #[inline]
    pub fn eval(self, a: &Bbox, b: &Bbox) -> f32 {
        scalar::overlap_pair(self, a, a.area(), b, b.area())
    }
}

/// Chunking and parallelism controls for overlap evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapParams {
    /// Query rows evaluated per chunk.
    pub chunk_rows: usize,
    /// Evaluate chunks on the rayon pool (needs the `rayon` feature).
    pub parallel: bool,
}

impl Default for OverlapParams {
    fn default() -> Self {
        Self {
            chunk_rows: DEFAULT_CHUNK_ROWS,
            parallel: false,
        }
    }
}

impl OverlapParams {
    /// Validates chunking parameters.
    pub fn validate(&self) -> RpnResult<()> {
        if self.chunk_rows == 0 {
            return Err(RpnError::InvalidConfig {
                reason: "chunk_rows must be > 0",
            });
        }
        Ok(())
    }
}

/// Kernel interface for per-row maximum overlap.
///
/// A kernel prepares the reference set once (`plan`) and then reduces each
/// query row to its maximum overlap across that set.
pub trait OverlapKernel {
    type Plan: Sync;

    /// Precomputes whatever the kernel needs from the reference boxes.
    fn plan(reference: &[Bbox]) -> Self::Plan;

    /// Writes `max_j metric(rows[i], reference[j])` into `out[i]`, or 0 for an
    /// empty reference set.
    fn row_max(metric: OverlapMetric, rows: &[Bbox], plan: &Self::Plan, out: &mut [f32]);
}

/// Dense row-major `[rows, cols]` overlap matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlapMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl OverlapMatrix {
    pub(crate) fn from_vec(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { data, rows, cols }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns entry `(i, j)` if it is within bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i >= self.rows || j >= self.cols {
            return None;
        }
        self.data.get(i * self.cols + j).copied()
    }

    /// Returns row `i` as a slice of length `cols`.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows {
            return None;
        }
        self.data.get(i * self.cols..(i + 1) * self.cols)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Reduces each row to its maximum, 0 for a matrix without columns.
    pub fn row_max(&self) -> Vec<f32> {
        (0..self.rows)
            .map(|i| {
                self.data[i * self.cols..(i + 1) * self.cols]
                    .iter()
                    .fold(0.0f32, |acc, &v| acc.max(v))
            })
            .collect()
    }
}

/// Pairwise IoU between `a` (`[N]`) and `b` (`[M]`), shape `[N, M]`.
pub fn pairwise_iou(a: &[Bbox], b: &[Bbox]) -> OverlapMatrix {
    dense(OverlapMetric::Iou, a, b)
}

/// Pairwise containment of each `a[i]` inside each `b[j]`, shape `[N, M]`.
pub fn pairwise_containment(a: &[Bbox], b: &[Bbox]) -> OverlapMatrix {
    dense(OverlapMetric::Containment, a, b)
}

fn dense(metric: OverlapMetric, a: &[Bbox], b: &[Bbox]) -> OverlapMatrix {
    let plan = scalar::ScalarPlan::new(b);
    let mut data = vec![0.0f32; a.len() * b.len()];
    scalar::fill_block(metric, a, &plan, &mut data);
    OverlapMatrix::from_vec(data, a.len(), b.len())
}

/// Pairwise overlap evaluated in row chunks of `params.chunk_rows`.
///
/// The final partial chunk is included, so the result equals
/// [`pairwise_iou`] / [`pairwise_containment`] for every chunk size.
pub fn pairwise_overlap(
    a: &[Bbox],
    b: &[Bbox],
    metric: OverlapMetric,
    params: OverlapParams,
) -> RpnResult<OverlapMatrix> {
    params.validate()?;
    let _span = trace_span!("pairwise_overlap", rows = a.len(), cols = b.len()).entered();

    let cols = b.len();
    let plan = scalar::ScalarPlan::new(b);
    let mut data = vec![0.0f32; a.len() * cols];
    if cols == 0 || a.is_empty() {
        return Ok(OverlapMatrix::from_vec(data, a.len(), cols));
    }

    #[cfg(feature = "rayon")]
    if params.parallel {
        self::rayon::fill_blocks_par(metric, a, &plan, params.chunk_rows, &mut data);
        return Ok(OverlapMatrix::from_vec(data, a.len(), cols));
    }

    let block = params.chunk_rows * cols;
    for (rows, out) in a.chunks(params.chunk_rows).zip(data.chunks_mut(block)) {
        scalar::fill_block(metric, rows, &plan, out);
    }
    Ok(OverlapMatrix::from_vec(data, a.len(), cols))
}

/// Maximum overlap of every `a[i]` against all of `b`.
///
/// Streams over `a` in chunks without materializing the `[N, M]` matrix.
/// An empty `b` yields all zeros.
pub fn max_overlap_per_row(
    a: &[Bbox],
    b: &[Bbox],
    metric: OverlapMetric,
    params: OverlapParams,
) -> RpnResult<Vec<f32>> {
    params.validate()?;
    let mut out = vec![0.0f32; a.len()];
    if a.is_empty() || b.is_empty() {
        return Ok(out);
    }

    let plan = <RowMaxKernel as OverlapKernel>::plan(b);

    #[cfg(feature = "rayon")]
    if params.parallel {
        self::rayon::row_max_par::<RowMaxKernel>(metric, a, &plan, params.chunk_rows, &mut out);
        return Ok(out);
    }

    for (rows, dst) in a
        .chunks(params.chunk_rows)
        .zip(out.chunks_mut(params.chunk_rows))
    {
        <RowMaxKernel as OverlapKernel>::row_max(metric, rows, &plan, dst);
    }
    Ok(out)
}
