// 该文件是 Yolodec 项目的一部分。
// src/output/console.rs - 控制台输出
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

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Detection,
  observation::ObjectObservation,
  output::{Annotation, Render},
};

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// `stdout:` 输出，每帧打印一段检测摘要
#[derive(Debug, Default)]
pub struct ConsoleOutput {
  annotation: Annotation,
  frame_counter: AtomicU64,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch);
    }
    Ok(ConsoleOutput::default())
  }
}

impl ConsoleOutput {
  pub fn with_annotation(mut self, annotation: Annotation) -> Self {
    self.annotation = annotation;
    self
  }

  fn describe(&self, detection: &Detection) -> String {
    let obs = &detection.observation;
    let class = match self.annotation.label(obs.class_id) {
      Some(label) => format!("{}({})", label, obs.class_id),
      None => format!("class {}", obs.class_id),
    };
    format!(
      "  #{} {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
      detection.index,
      class,
      obs.confidence * 100.0,
      detection.rect.x,
      detection.rect.y,
      detection.rect.width,
      detection.rect.height
    )
  }

  pub fn write_result(
    &self,
    writer: &mut impl Write,
    result: &[ObjectObservation],
  ) -> Result<(), ConsoleOutputError> {
    let frame = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
    writeln!(writer, "帧 {}: 检测到 {} 个对象", frame, result.len())?;
    for detection in self.annotation.detections(result) {
      writeln!(writer, "{}", self.describe(&detection))?;
    }
    Ok(())
  }
}

impl<F> Render<F, Vec<ObjectObservation>> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, _frame: &F, result: &Vec<ObjectObservation>) -> Result<(), Self::Error> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    self.write_result(&mut lock, result)?;
    lock.flush()?;
    Ok(())
  }
}
