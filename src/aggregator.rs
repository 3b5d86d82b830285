// 该文件是 Yolodec 项目的一部分。
// src/aggregator.rs - 多检测头候选汇总
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

use tracing::debug;

use crate::{
  cancel::CancelFlag,
  decoder::decode,
  detector::DetectError,
  observation::ObjectObservation,
  setup::LayerSetup,
};

/// 一个检测头的原始输出及其配置
pub type LayerInput<'a> = (&'a [f32], &'a LayerSetup);

fn decode_layer(
  layer: usize,
  (buffer, setup): LayerInput<'_>,
) -> Result<Vec<ObjectObservation>, DetectError> {
  let candidates: Vec<_> = decode(buffer, setup)
    .map_err(|source| DetectError::Decode { layer, source })?
    .collect();
  debug!(
    "检测头 {}: {}x{}x{} 个预测, {} 个候选",
    layer,
    setup.boxes_per_cell,
    setup.row_count,
    setup.col_count,
    candidates.len()
  );
  Ok(candidates)
}

/// 依次解码所有检测头并拼接候选，每个检测头之前检查取消标记
pub fn aggregate(
  layers: &[LayerInput<'_>],
  cancel: &CancelFlag,
) -> Result<Vec<ObjectObservation>, DetectError> {
  let mut candidates = Vec::new();
  for (layer, &input) in layers.iter().enumerate() {
    if cancel.is_cancelled() {
      return Err(DetectError::Cancelled);
    }
    candidates.extend(decode_layer(layer, input)?);
  }
  Ok(candidates)
}

/// 在 rayon 线程池上并行解码各检测头，结果按检测头顺序拼接
#[cfg(feature = "parallel")]
pub fn aggregate_parallel(
  layers: &[LayerInput<'_>],
  cancel: &CancelFlag,
) -> Result<Vec<ObjectObservation>, DetectError> {
  use rayon::prelude::*;

  let per_layer = layers
    .par_iter()
    .enumerate()
    .map(|(layer, &input)| {
      if cancel.is_cancelled() {
        return Err(DetectError::Cancelled);
      }
      decode_layer(layer, input)
    })
    .collect::<Result<Vec<_>, _>>()?;

  if cancel.is_cancelled() {
    return Err(DetectError::Cancelled);
  }

  Ok(per_layer.into_iter().flatten().collect())
}
