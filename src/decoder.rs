// 该文件是 Yolodec 项目的一部分。
// src/decoder.rs - 单检测头解码
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

use std::iter::FusedIterator;

use thiserror::Error;
use tracing::error;

use crate::{
  geometry::{decode_box, sigmoid},
  observation::ObjectObservation,
  setup::{BOX_ATTRIBUTES, LayerSetup, SetupError},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("检测头配置无效: {0}")]
  InvalidSetup(#[from] SetupError),
  #[error("输出缓冲区过短: 期望至少 {expected} 个元素, 实际 {actual}")]
  BufferTooShort { expected: usize, actual: usize },
}

/// 解码一个检测头的原始输出
///
/// 先校验配置与缓冲区长度，随后返回惰性迭代器，按 box → row → col 顺序
/// 产出置信度不低于阈值的候选。
pub fn decode<'a>(buffer: &'a [f32], setup: &'a LayerSetup) -> Result<LayerCandidates<'a>, DecodeError> {
  setup.validate()?;

  let expected = setup.required_len();
  if buffer.len() < expected {
    error!(
      "输出缓冲区过短: 期望至少 {} 个元素, 实际 {}",
      expected,
      buffer.len()
    );
    return Err(DecodeError::BufferTooShort {
      expected,
      actual: buffer.len(),
    });
  }

  Ok(LayerCandidates {
    buffer,
    setup,
    cursor: 0,
  })
}

/// 单检测头的候选迭代器，只能遍历一次
#[derive(Debug)]
pub struct LayerCandidates<'a> {
  buffer: &'a [f32],
  setup: &'a LayerSetup,
  cursor: usize,
}

impl LayerCandidates<'_> {
  fn cell(&self, cursor: usize) -> (usize, usize, usize) {
    let per_box = self.setup.row_count * self.setup.col_count;
    let box_index = cursor / per_box;
    let rest = cursor % per_box;
    (box_index, rest / self.setup.col_count, rest % self.setup.col_count)
  }

  fn decode_cell(&self, box_index: usize, row: usize, col: usize) -> Option<ObjectObservation> {
    let setup = self.setup;
    let base = setup.base_index(box_index, row, col);
    let data = &self.buffer[base..base + setup.attributes()];

    let objectness = sigmoid(data[4]);
    // objectness 已低于阈值时乘积不可能达标；NaN 同样丢弃
    if objectness.is_nan() || objectness < setup.confidence_threshold {
      return None;
    }

    let (class_id, max_logit) = data[BOX_ATTRIBUTES..].iter().enumerate().fold(
      (0usize, f32::NEG_INFINITY),
      |(best, best_logit), (idx, &logit)| {
        if logit > best_logit {
          (idx, logit)
        } else {
          (best, best_logit)
        }
      },
    );

    let confidence = objectness * sigmoid(max_logit);
    if confidence.is_nan() || confidence < setup.confidence_threshold {
      return None;
    }

    let bbox = decode_box(row, col, box_index, data[0], data[1], data[2], data[3], setup);
    Some(ObjectObservation::new(class_id, objectness, confidence, bbox))
  }
}

impl Iterator for LayerCandidates<'_> {
  type Item = ObjectObservation;

  fn next(&mut self) -> Option<Self::Item> {
    let total = self.setup.cell_count();
    while self.cursor < total {
      let (box_index, row, col) = self.cell(self.cursor);
      self.cursor += 1;
      if let Some(observation) = self.decode_cell(box_index, row, col) {
        return Some(observation);
      }
    }
    None
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (0, Some(self.setup.cell_count() - self.cursor))
  }
}

impl FusedIterator for LayerCandidates<'_> {}
