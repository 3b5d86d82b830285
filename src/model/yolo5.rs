// 该文件是 Yolodec 项目的一部分。
// src/model/yolo5.rs - 基于先验框的 YOLO 输出后处理模型
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
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  cancel::CancelFlag,
  detector::{DetectError, Detector, DetectorConfig},
  frame::Size,
  input::LayerOutputs,
  model::Model,
  observation::ObjectObservation,
  setup::{Anchor, BoxEncoding, DEFAULT_ANCHORS, LayerSetup, SetupError},
};

const YOLO5_DEFAULT_CONFIDENCE: f32 = 0.25;

#[derive(Error, Debug)]
pub enum Yolo5Error {
  #[error("模型描述加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型描述解析错误: {0}")]
  ModelParseError(#[from] serde_json::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("检测头 {head} 配置无效: {source}")]
  InvalidHead {
    head: usize,
    #[source]
    source: SetupError,
  },
  #[error("检测错误: {0}")]
  DetectError(#[from] DetectError),
}

/// 单个检测头的张量描述
#[derive(Debug, Clone, Deserialize)]
pub struct HeadSpec {
  /// `[batch, boxes, rows, cols, 5 + classes]`
  pub shape: Vec<usize>,
  /// 元素步长，缺省时按连续行主序推导
  #[serde(default)]
  pub strides: Option<Vec<usize>>,
  /// 每个 box 槽位的 `[width, height]`
  #[serde(default)]
  pub anchors: Option<Vec<[f32; 2]>>,
}

/// 模型输出描述文件（JSON）
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
  pub input_width: u32,
  pub input_height: u32,
  #[serde(default = "default_confidence")]
  pub confidence_threshold: f32,
  #[serde(default)]
  pub encoding: BoxEncoding,
  pub heads: Vec<HeadSpec>,
}

fn default_confidence() -> f32 {
  YOLO5_DEFAULT_CONFIDENCE
}

fn contiguous_strides(shape: &[usize]) -> Result<Vec<usize>, SetupError> {
  let mut strides = vec![1usize; shape.len()];
  for i in (0..shape.len().saturating_sub(1)).rev() {
    strides[i] = strides[i + 1]
      .checked_mul(shape[i + 1])
      .ok_or(SetupError::StrideOverflow)?;
  }
  Ok(strides)
}

impl ModelSpec {
  pub fn from_json(json: &str) -> Result<Self, Yolo5Error> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn input_size(&self) -> Size {
    Size::new(self.input_width as f32, self.input_height as f32)
  }

  /// 为每个检测头生成解码配置
  ///
  /// 未给出先验框时，三头三框的模型使用默认先验框，其余情况退化为格点尺寸。
  pub fn layer_setups(&self) -> Result<Vec<LayerSetup>, Yolo5Error> {
    if self.heads.is_empty() {
      return Err(Yolo5Error::ModelInvalid("模型至少需要一个检测头".to_string()));
    }

    let input = self.input_size();
    self
      .heads
      .iter()
      .enumerate()
      .map(|(head, spec)| {
        let invalid = |source| Yolo5Error::InvalidHead { head, source };
        let strides = match &spec.strides {
          Some(strides) => strides.clone(),
          None => contiguous_strides(&spec.shape).map_err(invalid)?,
        };

        let setup = LayerSetup::from_tensor(
          &spec.shape,
          &strides,
          input.width,
          input.height,
          self.confidence_threshold,
        )
        .map_err(invalid)?;

        let anchors: Vec<Anchor> = match &spec.anchors {
          Some(anchors) => anchors.iter().map(|&[w, h]| Anchor::new(w, h)).collect(),
          None if self.heads.len() == DEFAULT_ANCHORS.len() && setup.boxes_per_cell == 3 => {
            DEFAULT_ANCHORS[head].to_vec()
          }
          None => Vec::new(),
        };

        let setup = setup.with_anchors(anchors).with_encoding(self.encoding);
        setup.validate().map_err(invalid)?;

        debug!(
          "检测头 {}: {}x{} 网格, {} 个框, {} 个类别, 格点 {}x{}",
          head,
          setup.row_count,
          setup.col_count,
          setup.boxes_per_cell,
          setup.class_count,
          setup.horizontal_block_size,
          setup.vertical_block_size
        );
        Ok(setup)
      })
      .collect()
  }
}

pub struct Yolo5Builder {
  model_path: String,
  config: DetectorConfig,
  confidence_threshold: Option<f32>,
  cancel: CancelFlag,
}

impl FromUrlWithScheme for Yolo5Builder {
  const SCHEME: &'static str = "yolo5";
}

impl FromUrl for Yolo5Builder {
  type Error = Yolo5Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo5Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Yolo5Builder {
      model_path: url.path().to_string(),
      config: DetectorConfig::default(),
      confidence_threshold: None,
      cancel: CancelFlag::new(),
    })
  }
}

impl Yolo5Builder {
  pub fn detector_config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  /// 覆盖描述文件中的置信度阈值
  pub fn confidence_threshold(mut self, threshold: Option<f32>) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  /// 推理时检查的取消标志
  pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn build(self) -> Result<Yolo5, Yolo5Error> {
    info!("加载模型描述文件: {}", self.model_path);
    let json = std::fs::read_to_string(&self.model_path)?;
    let mut spec = ModelSpec::from_json(&json)?;
    if let Some(threshold) = self.confidence_threshold {
      spec.confidence_threshold = threshold;
    }
    Ok(Yolo5::from_spec(&spec, self.config)?.with_cancel_flag(self.cancel))
  }
}

/// 一组检测头配置加上检测器
#[derive(Debug, Clone)]
pub struct Yolo5 {
  setups: Vec<LayerSetup>,
  detector: Detector,
  input: Size,
  cancel: CancelFlag,
}

impl Yolo5 {
  pub fn from_spec(spec: &ModelSpec, config: DetectorConfig) -> Result<Self, Yolo5Error> {
    let setups = spec.layer_setups()?;
    let detector = Detector::new(config)?;
    info!(
      "模型就绪: 输入 {}x{}, {} 个检测头",
      spec.input_width,
      spec.input_height,
      setups.len()
    );
    Ok(Yolo5 {
      setups,
      detector,
      input: spec.input_size(),
      cancel: CancelFlag::new(),
    })
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn cancel_flag(&self) -> &CancelFlag {
    &self.cancel
  }

  pub fn setups(&self) -> &[LayerSetup] {
    &self.setups
  }

  pub fn input_size(&self) -> Size {
    self.input
  }

  pub fn infer_with_cancel(
    &self,
    input: &LayerOutputs,
    cancel: &CancelFlag,
  ) -> Result<Vec<ObjectObservation>, Yolo5Error> {
    let observations =
      self
        .detector
        .detect_with_cancel(&input.as_slices(), &self.setups, cancel)?;
    Ok(observations)
  }
}

impl Model for Yolo5 {
  type Input = LayerOutputs;
  type Output = Vec<ObjectObservation>;
  type Error = Yolo5Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.infer_with_cancel(input, &self.cancel)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SPEC: &str = r#"{
    "input_width": 64,
    "input_height": 32,
    "confidence_threshold": 0.3,
    "heads": [
      { "shape": [1, 3, 8, 8, 6] },
      { "shape": [1, 3, 4, 4, 6] },
      { "shape": [1, 3, 2, 2, 6] }
    ]
  }"#;

  #[test]
  fn contiguous_strides_are_row_major() {
    assert_eq!(
      contiguous_strides(&[1, 3, 4, 4, 6]).unwrap(),
      vec![288, 96, 24, 6, 1]
    );
    assert!(contiguous_strides(&[]).unwrap().is_empty());
  }

  #[test]
  fn oversized_shape_is_an_error() {
    let huge = 1usize << (usize::BITS / 2);
    let spec = ModelSpec {
      input_width: 64,
      input_height: 64,
      confidence_threshold: 0.5,
      encoding: BoxEncoding::default(),
      heads: vec![HeadSpec {
        shape: vec![1, huge, huge, 1, 6],
        strides: None,
        anchors: None,
      }],
    };
    assert!(matches!(
      spec.layer_setups(),
      Err(Yolo5Error::InvalidHead {
        head: 0,
        source: SetupError::StrideOverflow
      })
    ));
  }

  #[test]
  fn three_heads_use_default_anchors() {
    let spec = ModelSpec::from_json(SPEC).unwrap();
    let setups = spec.layer_setups().unwrap();
    assert_eq!(setups.len(), 3);
    assert_eq!(setups[2].anchors[2], Anchor::new(373.0, 326.0));
    assert_eq!(setups[0].horizontal_block_size, 8.0);
    assert_eq!(setups[0].vertical_block_size, 4.0);
    assert_eq!(setups[1].confidence_threshold, 0.3);
    assert_eq!(setups[1].encoding, BoxEncoding::Yolov5);
  }

  #[test]
  fn explicit_anchors_and_strides_win() {
    let spec = ModelSpec::from_json(
      r#"{
        "input_width": 16, "input_height": 16, "encoding": "yolov3",
        "heads": [{ "shape": [1, 1, 2, 2, 6], "strides": [24, 24, 12, 6, 1], "anchors": [[3, 4]] }]
      }"#,
    )
    .unwrap();
    let setups = spec.layer_setups().unwrap();
    assert_eq!(setups[0].anchors.as_ref(), &[Anchor::new(3.0, 4.0)]);
    assert_eq!(setups[0].encoding, BoxEncoding::Yolov3);
    assert_eq!(setups[0].confidence_threshold, YOLO5_DEFAULT_CONFIDENCE);
  }

  #[test]
  fn bad_head_is_reported_with_index() {
    let spec = ModelSpec::from_json(
      r#"{ "input_width": 16, "input_height": 16,
           "heads": [{ "shape": [1, 1, 2, 2, 6] }, { "shape": [1, 2, 2, 2, 6], "anchors": [[1, 1]] }] }"#,
    )
    .unwrap();
    assert!(matches!(
      spec.layer_setups(),
      Err(Yolo5Error::InvalidHead {
        head: 1,
        source: SetupError::AnchorCountMismatch { .. }
      })
    ));
  }

  #[test]
  fn builder_requires_scheme() {
    let url = Url::parse("file:///tmp/model.json").unwrap();
    assert!(matches!(
      Yolo5Builder::from_url(&url),
      Err(Yolo5Error::ModelPathError(_))
    ));
  }

  #[test]
  fn infer_checks_layer_count() {
    let spec = ModelSpec::from_json(SPEC).unwrap();
    let model = Yolo5::from_spec(&spec, DetectorConfig::default()).unwrap();
    let outputs = LayerOutputs::from(vec![vec![0.0; 8]]);
    assert!(matches!(
      model.infer(&outputs),
      Err(Yolo5Error::DetectError(DetectError::LayerCountMismatch {
        buffers: 1,
        setups: 3
      }))
    ));
  }

  #[test]
  fn builder_loads_description_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, SPEC).unwrap();

    let url = Url::parse(&format!("yolo5://{}", path.display())).unwrap();
    let model = Yolo5Builder::from_url(&url)
      .unwrap()
      .confidence_threshold(Some(0.6))
      .build()
      .unwrap();
    assert_eq!(model.setups().len(), 3);
    assert!(model.setups().iter().all(|s| s.confidence_threshold == 0.6));
    assert_eq!(model.input_size(), Size::new(64.0, 32.0));
  }

  #[test]
  fn cancelled_model_stops() {
    let spec = ModelSpec::from_json(SPEC).unwrap();
    let cancel = CancelFlag::new();
    let model = Yolo5::from_spec(&spec, DetectorConfig::default())
      .unwrap()
      .with_cancel_flag(cancel.clone());
    let outputs = LayerOutputs::from(
      model
        .setups()
        .iter()
        .map(|s| vec![-10.0; s.required_len()])
        .collect::<Vec<_>>(),
    );
    assert_eq!(model.infer(&outputs).unwrap(), vec![]);

    cancel.cancel();
    assert!(matches!(
      model.infer(&outputs),
      Err(Yolo5Error::DetectError(DetectError::Cancelled))
    ));
  }
}
