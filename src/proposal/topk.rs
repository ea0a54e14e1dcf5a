//! Partial top-k selection over scored candidates.

use std::cmp::Ordering;

#[inline]
fn score_cmp_desc(scores: &[f32], a: usize, b: usize) -> Ordering {
    scores[b].total_cmp(&scores[a])
}

/// Keeps the `k` highest-scoring entries of `candidates` (indices into
/// `scores`), in unspecified order.
///
/// Uses a linear-time partition; ties at the boundary are broken arbitrarily.
pub(crate) fn top_k_unsorted(candidates: &mut Vec<usize>, scores: &[f32], k: usize) {
    if k == 0 {
        candidates.clear();
        return;
    }
    if candidates.len() <= k {
        return;
    }
    candidates.select_nth_unstable_by(k - 1, |&a, &b| score_cmp_desc(scores, a, b));
    candidates.truncate(k);
}

/// Sorts candidate indices by descending score; equal scores keep their
/// relative order.
pub(crate) fn sort_desc(candidates: &mut [usize], scores: &[f32]) {
    candidates.sort_by(|&a, &b| score_cmp_desc(scores, a, b));
}
