// 该文件是 Yolodec 项目的一部分。
// src/labels.rs - 类别标签
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

use std::path::Path;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::info;

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 单个类别的描述信息
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
  pub identifier: String,
  pub name: String,
  pub alternative_names: Vec<String>,
  pub origin: Vec<String>,
  pub url: Option<String>,
  pub licence: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassInfo {
  identifier: String,
  name: Option<String>,
  #[serde(default)]
  alternative_names: Vec<String>,
  #[serde(default)]
  origin: Vec<String>,
  url: Option<String>,
  licence: Option<String>,
}

impl<'de> Deserialize<'de> for ClassInfo {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = RawClassInfo::deserialize(deserializer)?;
    Ok(ClassInfo {
      name: raw.name.unwrap_or_else(|| raw.identifier.clone()),
      identifier: raw.identifier,
      alternative_names: raw.alternative_names,
      origin: raw.origin,
      url: raw.url.filter(|u| !u.is_empty()),
      licence: raw.licence,
    })
  }
}

/// 按类别索引排列的标签集合
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct LabelSet {
  classes: Vec<ClassInfo>,
}

impl LabelSet {
  pub fn from_json(json: &str) -> Result<Self, LabelError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let labels = Self::from_json(&std::fs::read_to_string(path)?)?;
    info!("共 {} 个类别", labels.len());
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.classes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.classes.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&ClassInfo> {
    self.classes.get(class_id)
  }

  /// 类别显示名称，越界时返回 `"unknown"`
  pub fn name(&self, class_id: usize) -> &str {
    self
      .get(class_id)
      .map(|info| info.name.as_str())
      .unwrap_or(UNKNOWN_LABEL)
  }
}
