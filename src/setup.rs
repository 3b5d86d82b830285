// 该文件是 Yolodec 项目的一部分。
// src/setup.rs - 检测头配置
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

use serde::Deserialize;
use thiserror::Error;

/// 每个格点预测的固定通道数：x, y, w, h, objectness
pub const BOX_ATTRIBUTES: usize = 5;

/// 三个检测头（步长 8 / 16 / 32）的默认先验框，单位为模型输入像素
pub const DEFAULT_ANCHORS: [[Anchor; 3]; 3] = [
  [
    Anchor::new(10.0, 13.0),
    Anchor::new(16.0, 30.0),
    Anchor::new(33.0, 23.0),
  ],
  [
    Anchor::new(30.0, 61.0),
    Anchor::new(62.0, 45.0),
    Anchor::new(59.0, 119.0),
  ],
  [
    Anchor::new(116.0, 90.0),
    Anchor::new(156.0, 198.0),
    Anchor::new(373.0, 326.0),
  ],
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
  #[error("检测头尺寸无效: {0} 必须大于 0")]
  ZeroDimension(&'static str),
  #[error("置信度阈值无效: {0}, 必须位于 [0, 1]")]
  ThresholdOutOfRange(f32),
  #[error("格点尺寸无效: {0}")]
  InvalidBlockSize(f32),
  #[error("先验框数量不匹配: 期望 {expected}, 实际 {actual}")]
  AnchorCountMismatch { expected: usize, actual: usize },
  #[error("张量形状无效: {0:?}, 期望 [batch, boxes, rows, cols, 5 + classes]")]
  InvalidShape(Vec<usize>),
  #[error("步长或网格尺寸过大，索引计算溢出")]
  StrideOverflow,
}

/// 边框参数化方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxEncoding {
  /// `xy = 2σ(t) - 0.5`，`wh = (2σ(t))² · anchor`
  #[default]
  Yolov5,
  /// `xy = σ(t)`，`wh = e^t · anchor`
  Yolov3,
}

/// 先验框宽高（模型输入像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
  pub width: f32,
  pub height: f32,
}

impl Anchor {
  pub const fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }
}

/// 单个检测头的解码配置
///
/// 原始缓冲区按 `[boxes, rows, cols, 5 + classes]` 寻址，
/// 最后一维连续存放，前三维分别使用 `channel_stride`、
/// `vertical_stride` 与 `horizontal_stride`。
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSetup {
  pub class_count: usize,
  pub confidence_threshold: f32,

  pub channel_stride: usize,
  pub vertical_stride: usize,
  pub horizontal_stride: usize,

  pub boxes_per_cell: usize,
  pub row_count: usize,
  pub col_count: usize,

  pub vertical_block_size: f32,
  pub horizontal_block_size: f32,

  /// 每个 box 槽位一个先验框；为空时使用格点尺寸
  pub anchors: Box<[Anchor]>,
  pub encoding: BoxEncoding,
}

impl LayerSetup {
  /// 按连续行主序布局构造配置
  pub fn contiguous(
    class_count: usize,
    boxes_per_cell: usize,
    row_count: usize,
    col_count: usize,
    input_width: f32,
    input_height: f32,
    confidence_threshold: f32,
  ) -> Self {
    let attributes = class_count.saturating_add(BOX_ATTRIBUTES);
    let vertical_stride = col_count.saturating_mul(attributes);
    Self {
      class_count,
      confidence_threshold,
      channel_stride: row_count.saturating_mul(vertical_stride),
      vertical_stride,
      horizontal_stride: attributes,
      boxes_per_cell,
      row_count,
      col_count,
      vertical_block_size: input_height / row_count as f32,
      horizontal_block_size: input_width / col_count as f32,
      anchors: Box::default(),
      encoding: BoxEncoding::default(),
    }
  }

  /// 根据 5 维输出张量的形状与步长推导配置
  ///
  /// `shape` 为 `[batch, boxes, rows, cols, 5 + classes]`，`strides` 为对应元素步长。
  pub fn from_tensor(
    shape: &[usize],
    strides: &[usize],
    input_width: f32,
    input_height: f32,
    confidence_threshold: f32,
  ) -> Result<Self, SetupError> {
    if shape.len() != 5 || strides.len() != 5 || shape[4] <= BOX_ATTRIBUTES {
      return Err(SetupError::InvalidShape(shape.to_vec()));
    }

    let (boxes, rows, cols) = (shape[1], shape[2], shape[3]);
    if rows == 0 || cols == 0 {
      return Err(SetupError::InvalidShape(shape.to_vec()));
    }

    let setup = Self {
      class_count: shape[4] - BOX_ATTRIBUTES,
      confidence_threshold,
      channel_stride: strides[1],
      vertical_stride: strides[2],
      horizontal_stride: strides[3],
      boxes_per_cell: boxes,
      row_count: rows,
      col_count: cols,
      vertical_block_size: input_height / rows as f32,
      horizontal_block_size: input_width / cols as f32,
      anchors: Box::default(),
      encoding: BoxEncoding::default(),
    };
    setup.validate()?;
    Ok(setup)
  }

  pub fn with_anchors(mut self, anchors: impl Into<Box<[Anchor]>>) -> Self {
    self.anchors = anchors.into();
    self
  }

  pub fn with_encoding(mut self, encoding: BoxEncoding) -> Self {
    self.encoding = encoding;
    self
  }

  pub fn with_confidence_threshold(mut self, confidence_threshold: f32) -> Self {
    self.confidence_threshold = confidence_threshold;
    self
  }

  pub fn validate(&self) -> Result<(), SetupError> {
    for (name, value) in [
      ("class_count", self.class_count),
      ("boxes_per_cell", self.boxes_per_cell),
      ("row_count", self.row_count),
      ("col_count", self.col_count),
    ] {
      if value == 0 {
        return Err(SetupError::ZeroDimension(name));
      }
    }

    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(SetupError::ThresholdOutOfRange(self.confidence_threshold));
    }

    for size in [self.vertical_block_size, self.horizontal_block_size] {
      if !size.is_finite() || size <= 0.0 {
        return Err(SetupError::InvalidBlockSize(size));
      }
    }

    if self.checked_cell_count().is_none() || self.checked_required_len().is_none() {
      return Err(SetupError::StrideOverflow);
    }

    if !self.anchors.is_empty() && self.anchors.len() != self.boxes_per_cell {
      return Err(SetupError::AnchorCountMismatch {
        expected: self.boxes_per_cell,
        actual: self.anchors.len(),
      });
    }

    Ok(())
  }

  /// 每个预测的通道数
  pub fn attributes(&self) -> usize {
    self.class_count.saturating_add(BOX_ATTRIBUTES)
  }

  /// 覆盖所有被访问元素所需的最小缓冲区长度，溢出或维度为 0 时返回 `None`
  pub fn checked_required_len(&self) -> Option<usize> {
    let last = |count: usize, stride: usize| count.checked_sub(1)?.checked_mul(stride);
    last(self.boxes_per_cell, self.channel_stride)?
      .checked_add(last(self.row_count, self.vertical_stride)?)?
      .checked_add(last(self.col_count, self.horizontal_stride)?)?
      .checked_add(self.attributes())
  }

  /// 同 [`LayerSetup::checked_required_len`]，无法表示时饱和为 `usize::MAX`
  pub fn required_len(&self) -> usize {
    self.checked_required_len().unwrap_or(usize::MAX)
  }

  fn checked_cell_count(&self) -> Option<usize> {
    self
      .boxes_per_cell
      .checked_mul(self.row_count)?
      .checked_mul(self.col_count)
  }

  /// 网格中的预测总数
  pub fn cell_count(&self) -> usize {
    self.checked_cell_count().unwrap_or(usize::MAX)
  }

  pub fn base_index(&self, box_index: usize, row: usize, col: usize) -> usize {
    box_index * self.channel_stride + row * self.vertical_stride + col * self.horizontal_stride
  }

  pub fn anchor(&self, box_index: usize) -> Anchor {
    self
      .anchors
      .get(box_index)
      .copied()
      .unwrap_or(Anchor::new(self.horizontal_block_size, self.vertical_block_size))
  }
}
