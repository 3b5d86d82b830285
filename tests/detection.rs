// 该文件是 Yolodec 项目的一部分。
// tests/detection.rs - 解码与抑制的整体行为测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use approx::assert_relative_eq;
use rand::{Rng, SeedableRng, rngs::StdRng};

use yolodec::{
  Anchor, CancelFlag, Detector, DetectorConfig, LayerSetup, ObjectObservation,
  aggregator::{LayerInput, aggregate},
  decoder::decode,
  geometry::CenterBox,
  suppressor::{DEFAULT_IOU_THRESHOLD, suppress},
};

const BACKGROUND: f32 = -10.0;

fn logit(p: f32) -> f32 {
  (p / (1.0 - p)).ln()
}

fn observation(class_id: usize, confidence: f32, x: f32) -> ObjectObservation {
  ObjectObservation::new(
    class_id,
    confidence,
    confidence,
    CenterBox::new(x, 10.0, 10.0, 10.0),
  )
}

/// 2x2 网格，每格 8 像素，单框两类别；`(row, col)` 处的偏移 sigmoid 为 `(sx, sy)`
fn small_grid(row: usize, col: usize, sx: f32, sy: f32) -> (LayerSetup, Vec<f32>) {
  let setup = LayerSetup::contiguous(2, 1, 2, 2, 16.0, 16.0, 0.5)
    .with_anchors(vec![Anchor::new(4.0, 4.0)]);
  let mut buffer = vec![BACKGROUND; setup.required_len()];

  let base = setup.base_index(0, row, col);
  buffer[base] = logit(sx);
  buffer[base + 1] = logit(sy);
  buffer[base + 2] = 0.0;
  buffer[base + 3] = 0.0;
  buffer[base + 4] = logit(0.95);
  buffer[base + 5] = logit(0.9 / 0.95);
  buffer[base + 6] = logit(0.1);
  (setup, buffer)
}

fn random_layers(seed: u64) -> (Vec<LayerSetup>, Vec<Vec<f32>>) {
  let mut rng = StdRng::seed_from_u64(seed);
  let setups = vec![
    LayerSetup::contiguous(3, 2, 4, 4, 32.0, 32.0, 0.3),
    LayerSetup::contiguous(3, 2, 2, 2, 32.0, 32.0, 0.3),
  ];
  let buffers = setups
    .iter()
    .map(|setup| {
      (0..setup.required_len())
        .map(|_| rng.random_range(-3.0f32..3.0))
        .collect()
    })
    .collect();
  (setups, buffers)
}

fn slices(buffers: &[Vec<f32>]) -> Vec<&[f32]> {
  buffers.iter().map(Vec::as_slice).collect()
}

#[test]
fn single_detection_on_small_grid() {
  // 中心均为 (10, 10)：第 1 行第 1 列偏移 0.25，第 0 行偏移 1.25
  for (row, col, sx, sy) in [(1, 1, 0.375, 0.375), (0, 1, 0.375, 0.875)] {
    let (setup, buffer) = small_grid(row, col, sx, sy);
    let result = Detector::default()
      .detect(&[buffer.as_slice()], std::slice::from_ref(&setup))
      .unwrap();

    assert_eq!(result.len(), 1);
    let obs = result[0];
    assert_eq!(obs.class_id, 0);
    assert_relative_eq!(obs.x, 10.0, epsilon = 1e-4);
    assert_relative_eq!(obs.y, 10.0, epsilon = 1e-4);
    assert_relative_eq!(obs.width, 4.0, epsilon = 1e-4);
    assert_relative_eq!(obs.height, 4.0, epsilon = 1e-4);
    assert_relative_eq!(obs.objectness_score, 0.95, epsilon = 1e-4);
    assert_relative_eq!(obs.confidence, 0.9, epsilon = 1e-4);
  }
}

#[test]
fn nan_objectness_is_never_emitted() {
  let setup = LayerSetup::contiguous(1, 1, 1, 1, 8.0, 8.0, 0.5);
  let mut buffer = vec![0.0; setup.required_len()];
  buffer[4] = f32::NAN;
  assert!(decode(&buffer, &setup).unwrap().next().is_none());
  assert!(
    Detector::default()
      .detect(&[buffer.as_slice()], &[setup])
      .unwrap()
      .is_empty()
  );
}

#[test]
fn all_background_yields_nothing() {
  let setup = LayerSetup::contiguous(4, 3, 3, 3, 24.0, 24.0, 0.25);
  let buffer = vec![BACKGROUND; setup.required_len()];
  assert!(decode(&buffer, &setup).unwrap().next().is_none());
  let result = Detector::default()
    .detect(&[buffer.as_slice()], &[setup])
    .unwrap();
  assert!(result.is_empty());
}

#[test]
fn overlapping_same_class_keeps_stronger() {
  let a = observation(0, 0.9, 10.0);
  let b = observation(0, 0.6, 11.0);
  assert!(a.iou(&b) > DEFAULT_IOU_THRESHOLD);

  assert_eq!(suppress(&[b, a], DEFAULT_IOU_THRESHOLD), vec![a]);
}

#[test]
fn overlapping_different_classes_are_kept() {
  let a = observation(0, 0.9, 10.0);
  let b = observation(1, 0.6, 11.0);
  assert_eq!(suppress(&[b, a], DEFAULT_IOU_THRESHOLD), vec![a, b]);
}

#[test]
fn max_detections_truncates_strongest_first() {
  let setup = LayerSetup::contiguous(1, 1, 1, 4, 64.0, 16.0, 0.1);
  let mut buffer = vec![BACKGROUND; setup.required_len()];
  for (col, p) in [0.3f32, 0.9, 0.5, 0.7].into_iter().enumerate() {
    let base = setup.base_index(0, 0, col);
    buffer[base..base + 4].fill(0.0);
    buffer[base + 4] = logit(p);
    buffer[base + 5] = 10.0;
  }

  let detector = Detector::new(DetectorConfig::default().max_detections(Some(2))).unwrap();
  let result = detector.detect(&[buffer.as_slice()], &[setup]).unwrap();
  assert_eq!(result.len(), 2);
  assert_relative_eq!(result[0].objectness_score, 0.9, epsilon = 1e-4);
  assert_relative_eq!(result[1].objectness_score, 0.7, epsilon = 1e-4);
}

#[test]
fn emitted_candidates_meet_threshold() {
  for seed in 0..8 {
    let (setups, buffers) = random_layers(seed);
    for (buffer, setup) in buffers.iter().zip(&setups) {
      for candidate in decode(buffer, setup).unwrap() {
        assert!(candidate.confidence >= setup.confidence_threshold);
        assert!(candidate.class_id < setup.class_count);
      }
    }
  }
}

#[test]
fn raising_threshold_only_removes_candidates() {
  let (setups, buffers) = random_layers(42);
  let setup = &setups[0];
  let strict = setup.clone().with_confidence_threshold(0.5);

  let loose: Vec<_> = decode(&buffers[0], setup).unwrap().collect();
  let tight: Vec<_> = decode(&buffers[0], &strict).unwrap().collect();
  assert!(tight.len() <= loose.len());
  assert!(tight.iter().all(|c| loose.contains(c)));
}

#[test]
fn suppressed_output_is_consistent() {
  let detector = Detector::default();
  for seed in 0..8 {
    let (setups, buffers) = random_layers(seed);
    let result = detector.detect(&slices(&buffers), &setups).unwrap();
    assert_eq!(detector.detect(&slices(&buffers), &setups).unwrap(), result);

    // 每个类别置信度最高的候选一定保留
    let layers: Vec<LayerInput<'_>> = slices(&buffers).into_iter().zip(&setups).collect();
    let candidates = aggregate(&layers, &CancelFlag::new()).unwrap();
    for class_id in 0..setups[0].class_count {
      let top = candidates
        .iter()
        .filter(|c| c.class_id == class_id)
        .map(|c| c.confidence)
        .max_by(f32::total_cmp);
      if let Some(top) = top {
        assert!(
          result
            .iter()
            .any(|o| o.class_id == class_id && o.confidence == top)
        );
      }
    }

    for pair in result.windows(2) {
      assert!(pair[0].confidence >= pair[1].confidence);
    }
    for (i, a) in result.iter().enumerate() {
      for b in &result[i + 1..] {
        if a.class_id == b.class_id {
          assert!(a.iou(b) <= DEFAULT_IOU_THRESHOLD);
        }
      }
    }
    assert_eq!(suppress(&result, DEFAULT_IOU_THRESHOLD), result);
  }
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_matches_sequential() {
  let sequential = Detector::default();
  let parallel = Detector::new(DetectorConfig::default().parallel(true)).unwrap();
  for seed in 0..4 {
    let (setups, buffers) = random_layers(seed);
    assert_eq!(
      sequential.detect(&slices(&buffers), &setups).unwrap(),
      parallel.detect(&slices(&buffers), &setups).unwrap()
    );
  }
}
