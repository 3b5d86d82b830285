// 该文件是 Yolodec 项目的一部分。
// src/frame.rs - 检测框到显示区域的映射
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

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observation::ObjectObservation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
  #[error("未知的画面方向: {0}")]
  UnknownOrientation(String),
  #[error("尺寸格式无效: {0}, 期望 <宽>x<高>")]
  InvalidSize(String),
}

/// 显示画面相对模型输入的方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
  #[default]
  Portrait,
  LandscapeLeft,
  LandscapeRight,
  UpsideDown,
}

impl FromStr for Orientation {
  type Err = FrameError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "portrait" => Ok(Orientation::Portrait),
      "landscape-left" => Ok(Orientation::LandscapeLeft),
      "landscape-right" => Ok(Orientation::LandscapeRight),
      "upside-down" => Ok(Orientation::UpsideDown),
      _ => Err(FrameError::UnknownOrientation(s.to_string())),
    }
  }
}

/// 宽高尺寸，命令行格式为 `640x480`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
  pub width: f32,
  pub height: f32,
}

impl Size {
  pub fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }
}

impl FromStr for Size {
  type Err = FrameError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || FrameError::InvalidSize(s.to_string());
    let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: f32 = w.trim().parse().map_err(|_| invalid())?;
    let height: f32 = h.trim().parse().map_err(|_| invalid())?;
    if width <= 0.0 || height <= 0.0 {
      return Err(invalid());
    }
    Ok(Size { width, height })
  }
}

/// 左上角表示的显示区域矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

/// 把模型输入坐标系下的中心框映射到显示区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMapper {
  input: Size,
  bounds: Size,
  orientation: Orientation,
}

impl FrameMapper {
  pub fn new(input: Size, bounds: Size, orientation: Orientation) -> Self {
    Self {
      input,
      bounds,
      orientation,
    }
  }

  /// 显示区域与模型输入一致的映射
  pub fn identity(input: Size) -> Self {
    Self::new(input, input, Orientation::Portrait)
  }

  pub fn orientation(&self) -> Orientation {
    self.orientation
  }
}

impl Default for FrameMapper {
  fn default() -> Self {
    Self::identity(Size::new(1.0, 1.0))
  }
}

impl FrameMapper {
  pub fn map(&self, observation: &ObjectObservation) -> ViewRect {
    let sx = self.bounds.width / self.input.width;
    let sy = self.bounds.height / self.input.height;

    let left = observation.x - observation.width / 2.0;
    let top = observation.y - observation.height / 2.0;

    match self.orientation {
      Orientation::Portrait => ViewRect {
        x: left * sx,
        y: top * sy,
        width: observation.width * sx,
        height: observation.height * sy,
      },
      Orientation::LandscapeLeft => {
        let width = observation.height * sx;
        ViewRect {
          x: (self.bounds.width - width) - top * sx,
          y: left * sy,
          width,
          height: observation.width * sy,
        }
      }
      Orientation::LandscapeRight => {
        let height = observation.width * sy;
        ViewRect {
          x: top * sx,
          y: (self.bounds.height - height) - left * sy,
          width: observation.height * sx,
          height,
        }
      }
      Orientation::UpsideDown => {
        let width = observation.width * sx;
        let height = observation.height * sy;
        ViewRect {
          x: (self.bounds.width - width) - left * sx,
          y: (self.bounds.height - height) - top * sy,
          width,
          height,
        }
      }
    }
  }
}

/// 最终输出的检测结果，`index` 从 1 开始
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub index: usize,
  #[serde(flatten)]
  pub observation: ObjectObservation,
  pub rect: ViewRect,
}

/// 为 NMS 后的结果编号并映射到显示区域
pub fn enumerate_detections(
  observations: &[ObjectObservation],
  mapper: &FrameMapper,
) -> Vec<Detection> {
  observations
    .iter()
    .enumerate()
    .map(|(i, observation)| Detection {
      index: i + 1,
      observation: *observation,
      rect: mapper.map(observation),
    })
    .collect()
}
