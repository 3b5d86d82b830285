// 该文件是 Yolodec 项目的一部分。
// src/output/json_lines.rs - JSON Lines 记录输出
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

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Detection,
  observation::ObjectObservation,
  output::{Annotation, Render},
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("输出文件锁已损坏")]
  Poisoned,
}

#[derive(Serialize)]
struct DetectionRecord<'a> {
  timestamp: &'a str,
  frame: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  label: Option<&'a str>,
  #[serde(flatten)]
  detection: &'a Detection,
}

struct Sink {
  writer: BufWriter<File>,
  frame: u64,
}

/// `jsonl:///path/to/file.jsonl` 输出，每个检测结果写一行 JSON
///
/// 带 `?append` 时追加到已有文件，否则覆盖。
pub struct JsonLinesOutput {
  path: PathBuf,
  annotation: Annotation,
  sink: Mutex<Sink>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let append = url.query_pairs().any(|(k, _)| k == "append");
    let path = PathBuf::from(url.path());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(append)
      .truncate(!append)
      .open(&path)?;
    info!("检测记录写入: {}", path.display());

    Ok(JsonLinesOutput {
      path,
      annotation: Annotation::default(),
      sink: Mutex::new(Sink {
        writer: BufWriter::new(file),
        frame: 0,
      }),
    })
  }
}

impl JsonLinesOutput {
  pub fn with_annotation(mut self, annotation: Annotation) -> Self {
    self.annotation = annotation;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl<F> Render<F, Vec<ObjectObservation>> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, _frame: &F, result: &Vec<ObjectObservation>) -> Result<(), Self::Error> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut sink = self
      .sink
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    sink.frame += 1;
    let frame = sink.frame;

    for detection in self.annotation.detections(result) {
      let record = DetectionRecord {
        timestamp: &timestamp,
        frame,
        label: self.annotation.label(detection.observation.class_id),
        detection: &detection,
      };
      serde_json::to_writer(&mut sink.writer, &record)?;
      sink.writer.write_all(b"\n")?;
    }
    sink.writer.flush()?;
    debug!("第 {} 帧写入 {} 条记录", frame, result.len());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{geometry::CenterBox, labels::LabelSet};

  fn jsonl_url(path: &Path) -> Url {
    Url::parse(&format!("jsonl://{}", path.display())).unwrap()
  }

  fn read_records(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
      .unwrap()
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect()
  }

  #[test]
  fn writes_one_line_per_detection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("detections.jsonl");
    let labels = LabelSet::from_json(r#"[{"identifier": "person"}]"#).unwrap();
    let output = JsonLinesOutput::from_url(&jsonl_url(&path))
      .unwrap()
      .with_annotation(Annotation::default().with_labels(labels));
    assert_eq!(output.path(), path.as_path());

    let result = vec![
      ObjectObservation::new(0, 0.95, 0.9, CenterBox::new(10.0, 10.0, 4.0, 4.0)),
      ObjectObservation::new(0, 0.9, 0.6, CenterBox::new(40.0, 10.0, 4.0, 4.0)),
    ];
    output.render_result(&(), &result).unwrap();
    output.render_result(&(), &vec![]).unwrap();

    let records = read_records(&path);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["frame"], 1);
    assert_eq!(records[0]["index"], 1);
    assert_eq!(records[1]["index"], 2);
    assert_eq!(records[0]["label"], "person");
    assert_eq!(records[0]["class_id"], 0);
    assert_eq!(records[0]["rect"]["x"], 8.0);
    assert!(records[0]["timestamp"].as_str().unwrap().ends_with('Z'));
  }

  #[test]
  fn append_keeps_previous_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detections.jsonl");
    let result = vec![ObjectObservation::new(
      1,
      0.9,
      0.9,
      CenterBox::new(5.0, 5.0, 2.0, 2.0),
    )];

    JsonLinesOutput::from_url(&jsonl_url(&path))
      .unwrap()
      .render_result(&(), &result)
      .unwrap();
    let url = Url::parse(&format!("jsonl://{}?append", path.display())).unwrap();
    JsonLinesOutput::from_url(&url)
      .unwrap()
      .render_result(&(), &result)
      .unwrap();

    let records = read_records(&path);
    assert_eq!(records.len(), 2);
    assert!(records[0].get("label").is_none());
  }
}
