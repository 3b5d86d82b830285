// 该文件是 Yolodec 项目的一部分。
// src/detector.rs - 检测器入口
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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  aggregator::{LayerInput, aggregate},
  cancel::CancelFlag,
  decoder::DecodeError,
  observation::ObjectObservation,
  setup::LayerSetup,
  suppressor::{DEFAULT_IOU_THRESHOLD, suppress_cancellable},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
  #[error("检测头数量不匹配: {buffers} 个输出缓冲区, {setups} 个配置")]
  LayerCountMismatch { buffers: usize, setups: usize },
  #[error("检测头 {layer} 解码失败: {source}")]
  Decode {
    layer: usize,
    #[source]
    source: DecodeError,
  },
  #[error("IoU 阈值无效: {0}")]
  InvalidIouThreshold(f32),
  #[error("检测已取消")]
  Cancelled,
}

/// 检测器配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  /// NMS IoU 阈值
  pub iou_threshold: f32,
  /// 最多输出的目标数，`None` 表示不限制
  pub max_detections: Option<usize>,
  /// 多检测头、多类别并行处理
  pub parallel: bool,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_detections: None,
      parallel: false,
    }
  }
}

impl DetectorConfig {
  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn max_detections(mut self, max_detections: Option<usize>) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn parallel(mut self, parallel: bool) -> Self {
    self.parallel = parallel;
    self
  }
}

/// 解码 → 汇总 → NMS 的无状态流水线
#[derive(Debug, Clone, Default)]
pub struct Detector {
  config: DetectorConfig,
}

impl Detector {
  pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
    if !(0.0..=1.0).contains(&config.iou_threshold) {
      error!("IoU 阈值无效: {}", config.iou_threshold);
      return Err(DetectError::InvalidIouThreshold(config.iou_threshold));
    }
    #[cfg(not(feature = "parallel"))]
    if config.parallel {
      tracing::warn!("未启用 parallel 特性，回退到单线程处理");
    }
    Ok(Self { config })
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  /// 对每个检测头的原始输出做完整后处理
  pub fn detect(
    &self,
    buffers: &[&[f32]],
    setups: &[LayerSetup],
  ) -> Result<Vec<ObjectObservation>, DetectError> {
    self.detect_with_cancel(buffers, setups, &CancelFlag::new())
  }

  /// 与 [`Detector::detect`] 相同，取消时返回 [`DetectError::Cancelled`]，不产出部分结果
  pub fn detect_with_cancel(
    &self,
    buffers: &[&[f32]],
    setups: &[LayerSetup],
    cancel: &CancelFlag,
  ) -> Result<Vec<ObjectObservation>, DetectError> {
    if buffers.len() != setups.len() {
      error!(
        "检测头数量不匹配: {} 个输出缓冲区, {} 个配置",
        buffers.len(),
        setups.len()
      );
      return Err(DetectError::LayerCountMismatch {
        buffers: buffers.len(),
        setups: setups.len(),
      });
    }

    let layers: Vec<LayerInput<'_>> = buffers.iter().copied().zip(setups.iter()).collect();

    let candidates = self.aggregate(&layers, cancel)?;
    debug!("{} 个检测头共 {} 个候选", layers.len(), candidates.len());

    let mut observations = self.suppress(&candidates, cancel)?;
    if let Some(limit) = self.config.max_detections {
      observations.truncate(limit);
    }

    debug!("输出 {} 个目标", observations.len());
    Ok(observations)
  }

  fn aggregate(
    &self,
    layers: &[LayerInput<'_>],
    cancel: &CancelFlag,
  ) -> Result<Vec<ObjectObservation>, DetectError> {
    #[cfg(feature = "parallel")]
    if self.config.parallel {
      return crate::aggregator::aggregate_parallel(layers, cancel);
    }
    aggregate(layers, cancel)
  }

  fn suppress(
    &self,
    candidates: &[ObjectObservation],
    cancel: &CancelFlag,
  ) -> Result<Vec<ObjectObservation>, DetectError> {
    #[cfg(feature = "parallel")]
    if self.config.parallel {
      return crate::suppressor::suppress_parallel(candidates, self.config.iou_threshold, cancel);
    }
    suppress_cancellable(candidates, self.config.iou_threshold, cancel)
  }
}
