// 该文件是 Headcount （人头数） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::{Parser, ValueEnum};
use url::Url;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Report {
  #[default]
  Text,
  Json,
}

/// Headcount 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// SeetaFace 模型路径，例如 seeta:///usr/share/headcount/seeta_fd_frontal_v1.0.bin
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 摄像头设备
  #[arg(long, value_name = "CAMERA", default_value = "v4l:///dev/video0")]
  pub camera: Url,

  /// 拍摄照片的保存目录（默认 ~/Pictures/headcount）
  #[arg(long, value_name = "DIR")]
  pub pictures_dir: Option<PathBuf>,

  /// 预览输出，例如 image:///tmp/headcount-preview.png
  #[arg(long, value_name = "OUTPUT")]
  pub preview: Option<Url>,

  /// 只处理这一张图片，显示结果后退出
  #[arg(long, value_name = "IMAGE")]
  pub once: Option<String>,

  /// 丢弃被新采集取代的周期的检测结果
  #[arg(long)]
  pub discard_stale: bool,

  /// 按 EXIF 方向信息旋转图片
  #[arg(long)]
  pub fix_orientation: bool,

  /// 使用快速检测模式
  #[arg(long)]
  pub fast: bool,

  /// 不分配人脸跟踪编号
  #[arg(long)]
  pub no_tracking: bool,

  /// 结果输出格式
  #[arg(long, value_enum, default_value_t = Report::Text)]
  pub report: Report,
}
