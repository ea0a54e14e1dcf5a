use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rpnkit::lowlevel::pairwise_overlap;
use rpnkit::{
    max_overlap_per_row, pairwise_containment, pairwise_iou, Bbox, OverlapMetric, OverlapParams,
};

fn random_boxes(rng: &mut StdRng, n: usize) -> Vec<Bbox> {
    (0..n)
        .map(|_| {
            let x = rng.random_range(0.0f32..200.0);
            let y = rng.random_range(0.0f32..200.0);
            let w = rng.random_range(0.0f32..80.0);
            let h = rng.random_range(0.0f32..80.0);
            Bbox::new(x, y, x + w, y + h)
        })
        .collect()
}

#[test]
fn iou_is_bounded_and_symmetric() {
    let mut rng = StdRng::seed_from_u64(7);
    let a = random_boxes(&mut rng, 40);
    let b = random_boxes(&mut rng, 30);
    let ab = pairwise_iou(&a, &b);
    let ba = pairwise_iou(&b, &a);
    assert_eq!((ab.rows(), ab.cols()), (40, 30));
    for i in 0..a.len() {
        for j in 0..b.len() {
            let v = ab.get(i, j).unwrap();
            assert!((0.0..=1.0).contains(&v), "iou {v} out of range");
            assert_eq!(v, ba.get(j, i).unwrap());
        }
    }
}

#[test]
fn iou_of_box_with_itself_is_one() {
    let mut rng = StdRng::seed_from_u64(11);
    for b in random_boxes(&mut rng, 50) {
        if b.area() > 0.0 {
            assert!((OverlapMetric::Iou.eval(&b, &b) - 1.0).abs() < 1e-6);
        }
    }
}

#[test]
fn containment_is_bounded() {
    let mut rng = StdRng::seed_from_u64(3);
    let a = random_boxes(&mut rng, 25);
    let b = random_boxes(&mut rng, 25);
    let m = pairwise_containment(&a, &b);
    assert!(m.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn containment_is_asymmetric() {
    let small = Bbox::new(10.0, 10.0, 20.0, 20.0);
    let large = Bbox::new(0.0, 0.0, 100.0, 100.0);
    assert_eq!(OverlapMetric::Containment.eval(&small, &large), 1.0);
    assert!(OverlapMetric::Containment.eval(&large, &small) < 1.0);
    let m = pairwise_containment(&[small], &[large]);
    assert_eq!(m.get(0, 0), Some(1.0));
}

#[test]
fn chunking_never_changes_results() {
    let mut rng = StdRng::seed_from_u64(21);
    let a = random_boxes(&mut rng, 101);
    let b = random_boxes(&mut rng, 9);
    for metric in [OverlapMetric::Iou, OverlapMetric::Containment] {
        let dense = match metric {
            OverlapMetric::Iou => pairwise_iou(&a, &b),
            OverlapMetric::Containment => pairwise_containment(&a, &b),
        };
        for chunk_rows in [1, 7, 10, 64, 100, 101, 500] {
            let params = OverlapParams {
                chunk_rows,
                parallel: false,
            };
            let chunked = pairwise_overlap(&a, &b, metric, params).unwrap();
            assert_eq!(chunked, dense, "chunk_rows={chunk_rows}");
            let row_max = max_overlap_per_row(&a, &b, metric, params).unwrap();
            assert_eq!(row_max, dense.row_max(), "chunk_rows={chunk_rows}");
        }
    }
}
