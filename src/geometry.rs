// 该文件是 Yolodec 项目的一部分。
// src/geometry.rs - 网格几何变换
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

use crate::setup::{BoxEncoding, LayerSetup};

/// 以中心点表示的边框（模型输入像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl CenterBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// [x_min, y_min, x_max, y_max]
  pub fn corners(&self) -> [f32; 4] {
    let (hw, hh) = (self.width / 2.0, self.height / 2.0);
    [self.x - hw, self.y - hh, self.x + hw, self.y + hh]
  }

  /// 计算两个边框的 IoU，任一面积为 0 时返回 0
  pub fn iou(&self, other: &CenterBox) -> f32 {
    let area_a = self.area();
    if area_a <= 0.0 {
      return 0.0;
    }
    let area_b = other.area();
    if area_b <= 0.0 {
      return 0.0;
    }

    let [ax1, ay1, ax2, ay2] = self.corners();
    let [bx1, by1, bx2, by2] = other.corners();

    let intersection =
      (ax2.min(bx2) - ax1.max(bx1)).max(0.0) * (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 将网格相对的原始预测解码为绝对坐标边框
///
/// 越界的 `(row, col, box_index)` 属于调用方编程错误，直接 panic。
#[allow(clippy::too_many_arguments)]
pub fn decode_box(
  row: usize,
  col: usize,
  box_index: usize,
  raw_x: f32,
  raw_y: f32,
  raw_width: f32,
  raw_height: f32,
  setup: &LayerSetup,
) -> CenterBox {
  assert!(
    row < setup.row_count && col < setup.col_count && box_index < setup.boxes_per_cell,
    "格点索引越界: (row={}, col={}, box={}) 超出 {}x{}x{}",
    row,
    col,
    box_index,
    setup.row_count,
    setup.col_count,
    setup.boxes_per_cell
  );

  let anchor = setup.anchor(box_index);

  let (offset_x, offset_y, scale_w, scale_h) = match setup.encoding {
    BoxEncoding::Yolov5 => (
      sigmoid(raw_x) * 2.0 - 0.5,
      sigmoid(raw_y) * 2.0 - 0.5,
      (sigmoid(raw_width) * 2.0).powi(2),
      (sigmoid(raw_height) * 2.0).powi(2),
    ),
    BoxEncoding::Yolov3 => (
      sigmoid(raw_x),
      sigmoid(raw_y),
      raw_width.exp(),
      raw_height.exp(),
    ),
  };

  CenterBox {
    x: (col as f32 + offset_x) * setup.horizontal_block_size,
    y: (row as f32 + offset_y) * setup.vertical_block_size,
    width: scale_w * anchor.width,
    height: scale_h * anchor.height,
  }
}
