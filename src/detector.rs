// 该文件是 Headcount （人头数） 项目的一部分。
// src/detector.rs - 人脸检测器接口
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

use image::RgbaImage;
use thiserror::Error;

mod rustface_backend;
pub use self::rustface_backend::{RustfaceDetector, RustfaceDetectorBuilder};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("检测器内部错误: {0}")]
  Internal(String),
}

impl From<std::io::Error> for DetectError {
  fn from(err: std::io::Error) -> Self {
    DetectError::ModelLoadError(err)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceMode {
  Fast,
  #[default]
  Accurate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorOptions {
  pub mode: PerformanceMode,
  /// 为每张人脸分配跟踪编号
  pub tracking: bool,
}

impl Default for DetectorOptions {
  fn default() -> Self {
    Self {
      mode: PerformanceMode::Accurate,
      tracking: true,
    }
  }
}

/// 检测到的单张人脸，bbox 为像素坐标 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
  pub bbox: [f32; 4],
  pub score: f64,
  pub tracking_id: Option<u32>,
}

/// 可替换的人脸检测后端
pub trait FaceDetector: Send + Sync {
  fn detect(&self, image: &RgbaImage) -> Result<Vec<DetectedFace>, DetectError>;
}
