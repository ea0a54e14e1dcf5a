use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rpnkit::{
    select_fpn_proposals, select_proposals, Bbox, FpnProposalConfig, FpnProposalMode, ImageShape,
    KeepMask, LevelProposalInput, ProposalConfig, RpnError,
};

fn random_scene(seed: u64, n: usize) -> (Vec<Bbox>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let boxes = (0..n)
        .map(|_| {
            let x = rng.random_range(-20.0f32..300.0);
            let y = rng.random_range(-20.0f32..300.0);
            let w = rng.random_range(4.0f32..60.0);
            let h = rng.random_range(4.0f32..60.0);
            Bbox::new(x, y, x + w, y + h)
        })
        .collect();
    let scores = (0..n).map(|_| rng.random_range(-5.0f32..5.0)).collect();
    (boxes, scores)
}

#[test]
fn high_overlap_keeps_only_best_box() {
    // IoU of these two boxes is 0.9
    let boxes = [Bbox::new(0.0, 0.0, 100.0, 100.0), Bbox::new(0.0, 0.0, 100.0, 90.0)];
    let cfg = ProposalConfig {
        nms_iou: 0.5,
        ..ProposalConfig::default()
    };
    let set = select_proposals(&boxes, &[0.8, 0.95], ImageShape::new(200.0, 200.0), &cfg, None)
        .unwrap();
    assert_eq!(set.boxes, vec![boxes[1]]);
    assert_eq!(set.scores, vec![0.95]);
}

#[test]
fn output_respects_both_caps() {
    let (boxes, scores) = random_scene(5, 400);
    let image = ImageShape::new(256.0, 256.0);
    for (pre, post) in [(50, 1000), (1000, 20), (0, 10), (400, 400)] {
        let cfg = ProposalConfig {
            pre_nms_topk: pre,
            post_nms_topk: post,
            ..ProposalConfig::default()
        };
        let set = select_proposals(&boxes, &scores, image, &cfg, None).unwrap();
        assert!(set.len() <= pre.min(boxes.len()));
        assert!(set.len() <= post);
        assert_eq!(set.boxes.len(), set.scores.len());
    }
}

#[test]
fn survivors_are_clipped_and_mutually_distinct() {
    let (boxes, scores) = random_scene(9, 300);
    let image = ImageShape::new(256.0, 256.0);
    let cfg = ProposalConfig::default();
    let set = select_proposals(&boxes, &scores, image, &cfg, None).unwrap();
    for (i, a) in set.boxes.iter().enumerate() {
        assert!(a.x1 >= 0.0 && a.y1 >= 0.0 && a.x2 <= 256.0 && a.y2 <= 256.0);
        for b in &set.boxes[i + 1..] {
            assert!(rpnkit::OverlapMetric::Iou.eval(a, b) <= cfg.nms_iou);
        }
    }
    for s in &set.scores {
        assert!(scores.contains(s));
    }
}

#[test]
fn large_post_cap_returns_every_survivor() {
    let boxes: Vec<Bbox> = (0..6)
        .map(|i| Bbox::new(i as f32 * 30.0, 0.0, i as f32 * 30.0 + 20.0, 20.0))
        .collect();
    let scores = vec![0.5; 6];
    let cfg = ProposalConfig {
        post_nms_topk: 100,
        ..ProposalConfig::default()
    };
    let set = select_proposals(&boxes, &scores, ImageShape::new(50.0, 500.0), &cfg, None).unwrap();
    assert_eq!(set.len(), 6);
}

#[test]
fn inputs_are_not_modified() {
    let (boxes, scores) = random_scene(13, 100);
    let (boxes_copy, scores_copy) = (boxes.clone(), scores.clone());
    select_proposals(
        &boxes,
        &scores,
        ImageShape::new(100.0, 100.0),
        &ProposalConfig::default(),
        None,
    )
    .unwrap();
    assert_eq!(boxes, boxes_copy);
    assert_eq!(scores, scores_copy);
}

#[test]
fn empty_and_fully_masked_inputs() {
    let cfg = ProposalConfig::default();
    let image = ImageShape::new(10.0, 10.0);
    let set = select_proposals(&[], &[], image, &cfg, None).unwrap();
    assert!(set.boxes.is_empty() && set.scores.is_empty());

    let boxes = [Bbox::new(0.0, 0.0, 5.0, 5.0)];
    let set = select_proposals(&boxes, &[1.0], image, &cfg, Some(&[false])).unwrap();
    assert!(set.is_empty());
}

#[test]
fn mismatched_scores_are_rejected() {
    let boxes = [Bbox::new(0.0, 0.0, 5.0, 5.0); 2];
    let err = select_proposals(
        &boxes,
        &[1.0],
        ImageShape::new(10.0, 10.0),
        &ProposalConfig::default(),
        None,
    )
    .unwrap_err();
    assert_eq!(
        err,
        RpnError::ShapeMismatch {
            context: "scores per box",
            expected: 2,
            got: 1,
        }
    );
}

#[test]
fn fpn_modes_bound_their_output() {
    let (a, sa) = random_scene(1, 300);
    let (b, sb) = random_scene(2, 120);
    let levels = [LevelProposalInput::new(&a, &sa), LevelProposalInput::new(&b, &sb)];
    let image = ImageShape::new(256.0, 256.0);

    let level_cfg = FpnProposalConfig {
        per_level_topk: 40,
        ..FpnProposalConfig::default()
    };
    let set = select_fpn_proposals(&levels, image, &level_cfg, None).unwrap();
    assert!(set.len() <= 40);

    let joint_cfg = FpnProposalConfig {
        mode: FpnProposalMode::Joint,
        proposals: ProposalConfig {
            pre_nms_topk: 200,
            post_nms_topk: 25,
            ..ProposalConfig::default()
        },
        ..FpnProposalConfig::default()
    };
    let set = select_fpn_proposals(&levels, image, &joint_cfg, None).unwrap();
    assert!(set.len() <= 25);
}

#[test]
fn fpn_masks_restrict_each_level() {
    let a = [Bbox::new(0.0, 0.0, 10.0, 10.0), Bbox::new(50.0, 50.0, 60.0, 60.0)];
    let b = [Bbox::new(100.0, 0.0, 110.0, 10.0), Bbox::new(0.0, 100.0, 10.0, 110.0)];
    let (sa, sb) = ([3.0, 1.0], [4.0, 2.0]);
    let levels = [LevelProposalInput::new(&a, &sa), LevelProposalInput::new(&b, &sb)];
    let masks = [
        KeepMask::from_vec(vec![false, true], 1, 1, 2).unwrap(),
        KeepMask::from_vec(vec![true, false], 1, 2, 1).unwrap(),
    ];
    for mode in [FpnProposalMode::Level, FpnProposalMode::Joint] {
        let cfg = FpnProposalConfig {
            mode,
            ..FpnProposalConfig::default()
        };
        let mut set =
            select_fpn_proposals(&levels, ImageShape::new(200.0, 200.0), &cfg, Some(&masks))
                .unwrap();
        set.scores.sort_by(f32::total_cmp);
        assert_eq!(set.scores, vec![1.0, 4.0], "{mode:?}");
    }

    let short = [KeepMask::from_vec(vec![true], 1, 1, 1).unwrap(), masks[1].clone()];
    assert!(
        select_fpn_proposals(
            &levels,
            ImageShape::new(200.0, 200.0),
            &FpnProposalConfig::default(),
            Some(&short)
        )
        .is_err()
    );
}
