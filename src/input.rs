// 该文件是 Yolodec 项目的一部分。
// src/input.rs - 原始输出张量输入
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
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

const F32_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug)]
pub enum TensorInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch {
    expected: &'static str,
    found: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量文件长度 {0} 不是 4 字节的整数倍")]
  MisalignedLength(usize),
  #[error("没有提供任何检测头输出")]
  NoLayers,
}

/// 一次推理中所有检测头的原始输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerOutputs {
  buffers: Vec<Box<[f32]>>,
}

impl LayerOutputs {
  pub fn new(buffers: Vec<Box<[f32]>>) -> Self {
    Self { buffers }
  }

  pub fn len(&self) -> usize {
    self.buffers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffers.is_empty()
  }

  pub fn as_slices(&self) -> Vec<&[f32]> {
    self.buffers.iter().map(|b| &b[..]).collect()
  }
}

impl From<Vec<Vec<f32>>> for LayerOutputs {
  fn from(buffers: Vec<Vec<f32>>) -> Self {
    Self::new(buffers.into_iter().map(Vec::into_boxed_slice).collect())
  }
}

/// 小端序 f32 字节流转换为浮点数组
pub fn f32_from_le_bytes(bytes: &[u8]) -> Result<Vec<f32>, TensorInputError> {
  if bytes.len() % F32_BYTES != 0 {
    return Err(TensorInputError::MisalignedLength(bytes.len()));
  }
  Ok(
    bytes
      .chunks_exact(F32_BYTES)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect(),
  )
}

/// 从 `tensor:///path/to/head.bin` 读取的原始张量文件，
/// 每个 URL 对应一个检测头，只产出一帧
pub struct TensorFileInput {
  outputs: Option<LayerOutputs>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

fn read_tensor(url: &Url) -> Result<Box<[f32]>, TensorInputError> {
  if url.scheme() != TensorFileInput::SCHEME {
    error!(
      "URI scheme mismatch: expected '{}', found '{}'",
      TensorFileInput::SCHEME,
      url.scheme()
    );
    return Err(TensorInputError::SchemeMismatch {
      expected: TensorFileInput::SCHEME,
      found: url.scheme().to_string(),
    });
  }

  let path = url.path();
  info!("读取张量文件: {}", path);
  let data = f32_from_le_bytes(&std::fs::read(path)?)?;
  debug!("张量元素数量: {}", data.len());
  Ok(data.into_boxed_slice())
}

impl FromUrl for TensorFileInput {
  type Error = TensorInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_urls(std::slice::from_ref(url))
  }
}

impl TensorFileInput {
  pub fn from_urls(urls: &[Url]) -> Result<Self, TensorInputError> {
    if urls.is_empty() {
      return Err(TensorInputError::NoLayers);
    }
    let buffers = urls.iter().map(read_tensor).collect::<Result<Vec<_>, _>>()?;
    Ok(TensorFileInput {
      outputs: Some(LayerOutputs::new(buffers)),
    })
  }
}

impl Iterator for TensorFileInput {
  type Item = LayerOutputs;

  fn next(&mut self) -> Option<Self::Item> {
    self.outputs.take()
  }
}
