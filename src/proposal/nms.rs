//! Greedy IoU non-maximum suppression.

use crate::geometry::Bbox;
use crate::overlap::scalar::overlap_pair;
use crate::overlap::OverlapMetric;
use crate::proposal::topk::sort_desc;

/// Runs greedy NMS over `candidates` (indices into `boxes`/`scores`).
///
/// Candidates are visited by descending score. A candidate survives unless
/// its IoU with an earlier survivor is strictly greater than `iou_threshold`.
/// At most `max_out` survivors are returned, highest score first.
pub(crate) fn greedy_nms(
    boxes: &[Bbox],
    scores: &[f32],
    candidates: &mut [usize],
    iou_threshold: f32,
    max_out: usize,
) -> Vec<usize> {
    sort_desc(candidates, scores);
    let areas: Vec<f32> = candidates.iter().map(|&i| boxes[i].area()).collect();
    let mut suppressed = vec![false; candidates.len()];
    let mut kept = Vec::with_capacity(max_out.min(candidates.len()));

    for i in 0..candidates.len() {
        if kept.len() >= max_out {
            break;
        }
        if suppressed[i] {
            continue;
        }
        let current = &boxes[candidates[i]];
        kept.push(candidates[i]);

        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            let other = &boxes[candidates[j]];
            let iou = overlap_pair(OverlapMetric::Iou, current, areas[i], other, areas[j]);
            if iou > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_heavy_overlap_only() {
        let boxes = [
            Bbox::new(0.0, 0.0, 10.0, 10.0),
            Bbox::new(0.0, 0.0, 10.0, 10.5),
            Bbox::new(20.0, 20.0, 30.0, 30.0),
        ];
        let scores = [0.8, 0.9, 0.1];
        let mut idx = vec![0, 1, 2];
        let kept = greedy_nms(&boxes, &scores, &mut idx, 0.5, 10);
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn threshold_is_exclusive() {
        // IoU of these two boxes is exactly 0.5
        let boxes = [Bbox::new(0.0, 0.0, 4.0, 2.0), Bbox::new(0.0, 0.0, 2.0, 2.0)];
        let scores = [1.0, 0.5];
        let kept = greedy_nms(&boxes, &scores, &mut [0, 1], 0.5, 10);
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn output_is_capped() {
        let boxes: Vec<Bbox> = (0..5)
            .map(|i| Bbox::new(i as f32 * 20.0, 0.0, i as f32 * 20.0 + 5.0, 5.0))
            .collect();
        let scores = [0.1, 0.2, 0.3, 0.4, 0.5];
        let kept = greedy_nms(&boxes, &scores, &mut [0, 1, 2, 3, 4], 0.7, 2);
        assert_eq!(kept, vec![4, 3]);
    }
}
