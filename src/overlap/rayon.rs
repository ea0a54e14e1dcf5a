//! Rayon-parallel overlap evaluation (feature-gated).
//!
//! Chunks of query rows are independent, so each one is handed to the pool
//! and written into its own disjoint slice of the output. The result is
//! laid out exactly as the sequential chunk loop would produce it.

use crate::geometry::Bbox;
use crate::overlap::scalar::{fill_block, ScalarPlan};
use crate::overlap::{OverlapKernel, OverlapMetric};
use rayon::prelude::*;

/// Chunk-parallel per-row maximum.
pub fn row_max_par<K: OverlapKernel>(
    metric: OverlapMetric,
    rows: &[Bbox],
    plan: &K::Plan,
    chunk_rows: usize,
    out: &mut [f32],
) {
    debug_assert_eq!(rows.len(), out.len());
    out.par_chunks_mut(chunk_rows)
        .zip(rows.par_chunks(chunk_rows))
        .for_each(|(dst, chunk)| K::row_max(metric, chunk, plan, dst));
}

/// Chunk-parallel dense matrix fill, row-major `[rows.len(), plan.len()]`.
pub(crate) fn fill_blocks_par(
    metric: OverlapMetric,
    rows: &[Bbox],
    plan: &ScalarPlan,
    chunk_rows: usize,
    out: &mut [f32],
) {
    let block = chunk_rows * plan.len();
    out.par_chunks_mut(block)
        .zip(rows.par_chunks(chunk_rows))
        .for_each(|(dst, chunk)| fill_block(metric, chunk, plan, dst));
}
