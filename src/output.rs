// 该文件是 Yolodec 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Detection, FrameMapper, enumerate_detections},
  labels::LabelSet,
  observation::ObjectObservation,
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod console;
pub use self::console::{ConsoleOutput, ConsoleOutputError};

mod json_lines;
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputError};

/// 输出共用的标签与坐标映射
#[derive(Debug, Clone, Default)]
pub struct Annotation {
  labels: Option<LabelSet>,
  mapper: FrameMapper,
}

impl Annotation {
  pub fn with_labels(mut self, labels: LabelSet) -> Self {
    self.labels = Some(labels);
    self
  }

  pub fn with_mapper(mut self, mapper: FrameMapper) -> Self {
    self.mapper = mapper;
    self
  }

  /// 未加载标签时返回 `None`
  pub fn label(&self, class_id: usize) -> Option<&str> {
    self.labels.as_ref().map(|labels| labels.name(class_id))
  }

  pub fn detections(&self, observations: &[ObjectObservation]) -> Vec<Detection> {
    enumerate_detections(observations, &self.mapper)
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("控制台输出错误: {0}")]
  ConsoleOutputError(#[from] ConsoleOutputError),
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  ConsoleOutput(ConsoleOutput),
  JsonLinesOutput(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => Ok(OutputWrapper::ConsoleOutput(ConsoleOutput::from_url(url)?)),
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLinesOutput(JsonLinesOutput::from_url(
        url,
      )?)),
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl OutputWrapper {
  pub fn with_annotation(self, annotation: Annotation) -> Self {
    match self {
      OutputWrapper::ConsoleOutput(output) => {
        OutputWrapper::ConsoleOutput(output.with_annotation(annotation))
      }
      OutputWrapper::JsonLinesOutput(output) => {
        OutputWrapper::JsonLinesOutput(output.with_annotation(annotation))
      }
    }
  }
}

impl<F> Render<F, Vec<ObjectObservation>> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &Vec<ObjectObservation>) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::ConsoleOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::JsonLinesOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
