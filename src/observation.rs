// 该文件是 Yolodec 项目的一部分。
// src/observation.rs - 检测结果定义
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

use serde::Serialize;

use crate::geometry::CenterBox;

/// 单个目标观测
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectObservation {
  /// 类别索引（从 0 开始）
  pub class_id: usize,
  /// sigmoid 后的目标置信度
  pub objectness_score: f32,
  /// objectness × 最高类别概率
  pub confidence: f32,
  /// 边框中心 x 坐标
  pub x: f32,
  /// 边框中心 y 坐标
  pub y: f32,
  /// 边框宽度
  pub width: f32,
  /// 边框高度
  pub height: f32,
}

impl ObjectObservation {
  pub fn new(class_id: usize, objectness_score: f32, confidence: f32, bbox: CenterBox) -> Self {
    Self {
      class_id,
      objectness_score,
      confidence,
      x: bbox.x,
      y: bbox.y,
      width: bbox.width,
      height: bbox.height,
    }
  }

  pub fn bbox(&self) -> CenterBox {
    CenterBox::new(self.x, self.y, self.width, self.height)
  }

  pub fn iou(&self, other: &ObjectObservation) -> f32 {
    self.bbox().iou(&other.bbox())
  }
}
