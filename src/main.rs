// 该文件是 Yolodec 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};

use yolodec::{
  CancelFlag, DetectorConfig, FromUrl,
  frame::FrameMapper,
  input::TensorFileInput,
  labels::LabelSet,
  model::Yolo5Builder,
  output::{Annotation, OutputWrapper},
  task::{OneShotTask, RepeatShotTask, Task},
};

fn main() -> Result<()> {
  let args = args::Args::parse();

  tracing_subscriber::fmt()
    .with_max_level(if args.verbose {
      Level::DEBUG
    } else {
      Level::INFO
    })
    .init();

  info!("模型描述: {}", args.model);
  info!("检测头输出: {} 个", args.layers.len());
  info!("输出路径: {}", args.output);

  let cancel = CancelFlag::new();
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      cancel.cancel();
    })?;
  }

  let config = DetectorConfig::default()
    .iou_threshold(args.iou)
    .max_detections(args.max_detections())
    .parallel(args.parallel);
  let model = Yolo5Builder::from_url(&args.model)?
    .detector_config(config)
    .confidence_threshold(args.confidence)
    .cancel_flag(cancel.clone())
    .build()?;

  let input = TensorFileInput::from_urls(&args.layers)?;

  let input_size = model.input_size();
  let mapper = FrameMapper::new(
    input_size,
    args.bounds.unwrap_or(input_size),
    args.orientation,
  );
  let mut annotation = Annotation::default().with_mapper(mapper);
  if let Some(path) = &args.labels {
    annotation = annotation.with_labels(LabelSet::load(path)?);
  }
  let output = OutputWrapper::from_url(&args.output)?.with_annotation(annotation);

  if args.repeat > 1 {
    RepeatShotTask::new(args.repeat)
      .with_cancel_flag(cancel)
      .run_task(input, model, output)?;
  } else {
    OneShotTask.run_task(input, model, output)?;
  }

  Ok(())
}
