// 该文件是 Yolodec 项目的一部分。
// src/suppressor.rs - 按类别的非极大值抑制
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

use std::ops::Range;

use tracing::debug;

use crate::{cancel::CancelFlag, detector::DetectError, observation::ObjectObservation};

/// 默认 NMS IoU 阈值
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// 对候选下标做一次划分：先按类别，再按置信度降序，
/// 相同置信度保留输入顺序。返回排序后的下标与每个类别的区间。
fn partition_by_class(observations: &[ObjectObservation]) -> (Vec<usize>, Vec<Range<usize>>) {
  let mut order: Vec<usize> = (0..observations.len()).collect();
  order.sort_by(|&a, &b| {
    let (a, b) = (&observations[a], &observations[b]);
    a.class_id
      .cmp(&b.class_id)
      .then_with(|| b.confidence.total_cmp(&a.confidence))
  });

  let mut groups = Vec::new();
  let mut start = 0;
  for i in 1..=order.len() {
    if i == order.len() || observations[order[i]].class_id != observations[order[start]].class_id {
      groups.push(start..i);
      start = i;
    }
  }
  (order, groups)
}

/// 单类别贪心 NMS，`indices` 已按置信度降序排列
fn suppress_group(
  observations: &[ObjectObservation],
  indices: &[usize],
  iou_threshold: f32,
) -> Vec<usize> {
  let mut active = vec![true; indices.len()];
  let mut kept = Vec::new();

  for i in 0..indices.len() {
    if !active[i] {
      continue;
    }
    let selected = &observations[indices[i]];
    kept.push(indices[i]);

    for j in i + 1..indices.len() {
      if active[j] && selected.iou(&observations[indices[j]]) > iou_threshold {
        active[j] = false;
      }
    }
  }
  kept
}

/// 合并各类别结果并按置信度全局降序排列
fn merge(observations: &[ObjectObservation], mut kept: Vec<usize>) -> Vec<ObjectObservation> {
  kept.sort_unstable();
  kept.sort_by(|&a, &b| observations[b].confidence.total_cmp(&observations[a].confidence));
  debug!("NMS: {} 个候选保留 {} 个", observations.len(), kept.len());
  kept.into_iter().map(|i| observations[i]).collect()
}

/// 按类别做非极大值抑制，输出按置信度降序
pub fn suppress(observations: &[ObjectObservation], iou_threshold: f32) -> Vec<ObjectObservation> {
  let (order, groups) = partition_by_class(observations);
  let kept = groups
    .into_iter()
    .flat_map(|range| suppress_group(observations, &order[range], iou_threshold))
    .collect();
  merge(observations, kept)
}

/// 与 [`suppress`] 相同，但在每个类别之前检查取消标记
pub fn suppress_cancellable(
  observations: &[ObjectObservation],
  iou_threshold: f32,
  cancel: &CancelFlag,
) -> Result<Vec<ObjectObservation>, DetectError> {
  let (order, groups) = partition_by_class(observations);
  let mut kept = Vec::new();
  for range in groups {
    if cancel.is_cancelled() {
      return Err(DetectError::Cancelled);
    }
    kept.extend(suppress_group(observations, &order[range], iou_threshold));
  }
  Ok(merge(observations, kept))
}

/// 各类别在 rayon 线程池上并行抑制，全部完成后再合并排序
#[cfg(feature = "parallel")]
pub fn suppress_parallel(
  observations: &[ObjectObservation],
  iou_threshold: f32,
  cancel: &CancelFlag,
) -> Result<Vec<ObjectObservation>, DetectError> {
  use rayon::prelude::*;

  let (order, groups) = partition_by_class(observations);
  let per_class = groups
    .into_par_iter()
    .map(|range| {
      if cancel.is_cancelled() {
        return Err(DetectError::Cancelled);
      }
      Ok(suppress_group(observations, &order[range], iou_threshold))
    })
    .collect::<Result<Vec<_>, _>>()?;

  if cancel.is_cancelled() {
    return Err(DetectError::Cancelled);
  }

  Ok(merge(observations, per_class.into_iter().flatten().collect()))
}
