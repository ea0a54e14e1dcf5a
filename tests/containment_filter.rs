use rpnkit::lowlevel::containment_keep_flags;
use rpnkit::{
    filter_by_containment, AnchorGenerator, Bbox, ContainmentFilterConfig, FpnAnchorConfig,
    OverlapMetric, OverlapParams,
};

fn parents() -> Vec<Bbox> {
    vec![Bbox::new(40.0, 40.0, 180.0, 150.0), Bbox::new(200.0, 10.0, 250.0, 60.0)]
}

fn fpn() -> FpnAnchorConfig {
    FpnAnchorConfig::from_strides(&[8, 16, 32], &[16.0, 32.0, 64.0], vec![0.5, 1.0, 2.0], 256)
        .unwrap()
}

#[test]
fn masks_align_with_levels() {
    let anchors = AnchorGenerator::default().generate_fpn(&fpn()).unwrap();
    let masks =
        filter_by_containment(&parents(), anchors.levels(), &ContainmentFilterConfig::default())
            .unwrap();
    assert_eq!(masks.len(), anchors.len());
    for (mask, grid) in masks.iter().zip(anchors.iter()) {
        assert_eq!(mask.shape(), [grid.field_h(), grid.field_w(), grid.num_anchors()]);
        assert!(mask.count() > 0);
        assert!(mask.count() < mask.len());
    }
}

#[test]
fn kept_anchors_really_lie_inside_a_parent() {
    let anchors = AnchorGenerator::default().generate_fpn(&fpn()).unwrap();
    let cfg = ContainmentFilterConfig::default();
    let masks = filter_by_containment(&parents(), anchors.levels(), &cfg).unwrap();
    for (mask, grid) in masks.iter().zip(anchors.iter()) {
        for (keep, anchor) in mask.as_slice().iter().zip(grid.as_slice()) {
            let best = parents()
                .iter()
                .map(|p| OverlapMetric::Containment.eval(anchor, p))
                .fold(0.0f32, f32::max);
            assert_eq!(*keep, best > cfg.threshold);
        }
    }
}

#[test]
fn raising_threshold_never_keeps_more() {
    let anchors = AnchorGenerator::default().generate_fpn(&fpn()).unwrap();
    let mut previous = usize::MAX;
    for threshold in [0.0, 0.1, 0.3, 0.5, 0.7, 0.9, 0.99] {
        let cfg = ContainmentFilterConfig {
            threshold,
            ..ContainmentFilterConfig::default()
        };
        let kept: usize = filter_by_containment(&parents(), anchors.levels(), &cfg)
            .unwrap()
            .iter()
            .map(|m| m.count())
            .sum();
        assert!(kept <= previous, "threshold {threshold}: {kept} > {previous}");
        previous = kept;
    }
}

#[test]
fn without_parents_nothing_is_kept() {
    let anchors = AnchorGenerator::default().generate_fpn(&fpn()).unwrap();
    let masks =
        filter_by_containment(&[], anchors.levels(), &ContainmentFilterConfig::default()).unwrap();
    assert!(masks.iter().all(|m| m.count() == 0));
}

#[test]
fn iou_metric_is_stricter_for_small_anchors() {
    let parent = [Bbox::new(0.0, 0.0, 100.0, 100.0)];
    let anchors = [Bbox::new(10.0, 10.0, 30.0, 30.0)];
    let containment = ContainmentFilterConfig::default();
    let iou = ContainmentFilterConfig {
        metric: OverlapMetric::Iou,
        ..containment
    };
    assert_eq!(containment_keep_flags(&parent, &anchors, &containment).unwrap(), vec![true]);
    assert_eq!(containment_keep_flags(&parent, &anchors, &iou).unwrap(), vec![false]);
}

#[test]
fn zero_chunk_rows_is_rejected() {
    let cfg = ContainmentFilterConfig {
        overlap: OverlapParams {
            chunk_rows: 0,
            parallel: false,
        },
        ..ContainmentFilterConfig::default()
    };
    assert!(containment_keep_flags(&parents(), &parents(), &cfg).is_err());
}

#[test]
fn negative_threshold_cannot_keep_orphan_anchors() {
    let anchors = AnchorGenerator::default().generate_fpn(&fpn()).unwrap();
    let cfg = ContainmentFilterConfig {
        threshold: -0.5,
        ..ContainmentFilterConfig::default()
    };
    assert!(filter_by_containment(&[], anchors.levels(), &cfg).is_err());

    let masks =
        filter_by_containment(&[], anchors.levels(), &ContainmentFilterConfig::default()).unwrap();
    assert!(masks.iter().all(|m| m.count() == 0));
}
