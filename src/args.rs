// 该文件是 Yolodec 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use yolodec::frame::{Orientation, Size};

/// Yolodec 参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型描述文件，例如 yolo5:///path/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 检测头原始输出，按模型描述中的顺序重复给出，例如 tensor:///path/head0.bin
  #[arg(long = "layer", value_name = "TENSOR", required = true)]
  pub layers: Vec<Url>,

  /// 输出路径
  /// 支持格式:
  /// - 控制台: stdout:
  /// - JSON Lines: jsonl:///path/detections.jsonl[?append]
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,

  /// 类别标签 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 覆盖模型描述中的置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub iou: f32,

  /// 最多输出的目标数量，0 表示无限制
  #[arg(long, default_value = "32", value_name = "COUNT")]
  pub max_detections: usize,

  /// 多检测头并行解码
  #[arg(long)]
  pub parallel: bool,

  /// 显示区域尺寸，缺省与模型输入一致
  #[arg(long, value_name = "WxH")]
  pub bounds: Option<Size>,

  /// 显示画面方向
  #[arg(long, default_value = "portrait", value_name = "ORIENTATION")]
  pub orientation: Orientation,

  /// 重复解码次数，大于 1 时统计平均耗时
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub repeat: usize,

  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

impl Args {
  pub fn max_detections(&self) -> Option<usize> {
    (self.max_detections > 0).then_some(self.max_detections)
  }
}
