// 该文件是 Headcount （人头数） 项目的一部分。
// src/detector/rustface_backend.rs - SeetaFace 检测后端
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

use std::{
  fs::File,
  io::BufReader,
  sync::atomic::{AtomicU32, Ordering},
};

use image::{GrayImage, RgbaImage, imageops};
use tracing::{debug, info};
use url::Url;

use super::{DetectError, DetectedFace, DetectorOptions, FaceDetector, PerformanceMode};
use crate::{FromUrl, FromUrlWithScheme};

// SeetaFace 要求的最小人脸尺寸
const MIN_FACE_SIZE: u32 = 20;
const SCORE_THRESH: f64 = 2.0;

pub struct RustfaceDetectorBuilder {
  model_path: String,
  options: DetectorOptions,
}

impl FromUrlWithScheme for RustfaceDetectorBuilder {
  const SCHEME: &'static str = "seeta";
}

impl FromUrl for RustfaceDetectorBuilder {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| DetectError::ModelPathError(e.to_string()))?
      .into_owned();

    Ok(RustfaceDetectorBuilder {
      model_path,
      options: DetectorOptions::default(),
    })
  }
}

impl RustfaceDetectorBuilder {
  pub fn options(mut self, options: DetectorOptions) -> Self {
    self.options = options;
    self
  }

  pub fn build(self) -> Result<RustfaceDetector, DetectError> {
    info!("加载模型文件: {}", self.model_path);
    let file = File::open(&self.model_path)?;
    let model = rustface::read_model(BufReader::new(file))?;
    info!("模型加载完成");

    Ok(RustfaceDetector {
      model,
      options: self.options,
      next_tracking_id: AtomicU32::new(1),
    })
  }
}

/// 基于 `rustface` 的检测器，每次调用都从模型克隆出独立的检测实例
pub struct RustfaceDetector {
  model: rustface::Model,
  options: DetectorOptions,
  next_tracking_id: AtomicU32,
}

impl RustfaceDetector {
  fn configure(&self) -> Box<dyn rustface::Detector> {
    let mut detector = rustface::create_detector_with_model(self.model.clone());
    detector.set_min_face_size(MIN_FACE_SIZE);
    detector.set_score_thresh(SCORE_THRESH);
    match self.options.mode {
      PerformanceMode::Accurate => {
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(2, 2);
      }
      PerformanceMode::Fast => {
        detector.set_pyramid_scale_factor(0.7);
        detector.set_slide_window_step(4, 4);
      }
    }
    detector
  }

  fn tracking_id(&self) -> Option<u32> {
    self
      .options
      .tracking
      .then(|| self.next_tracking_id.fetch_add(1, Ordering::Relaxed))
  }
}

/// 小于最小人脸尺寸的图像不可能包含人脸，直接返回空结果
fn scan_faces(
  image: &RgbaImage,
  scan: impl FnOnce(&GrayImage) -> Vec<DetectedFace>,
) -> Vec<DetectedFace> {
  let (width, height) = image.dimensions();
  if width < MIN_FACE_SIZE || height < MIN_FACE_SIZE {
    debug!("图像 {}x{} 小于最小人脸尺寸", width, height);
    return Vec::new();
  }

  scan(&imageops::grayscale(image))
}

impl FaceDetector for RustfaceDetector {
  fn detect(&self, image: &RgbaImage) -> Result<Vec<DetectedFace>, DetectError> {
    let faces = scan_faces(image, |gray| {
      let mut detector = self.configure();
      detector
        .detect(&rustface::ImageData::new(
          gray.as_raw(),
          gray.width(),
          gray.height(),
        ))
        .iter()
        .map(|face| {
          let bbox = face.bbox();
          let x = bbox.x() as f32;
          let y = bbox.y() as f32;
          DetectedFace {
            bbox: [x, y, x + bbox.width() as f32, y + bbox.height() as f32],
            score: face.score(),
            tracking_id: self.tracking_id(),
          }
        })
        .collect()
    });
    debug!("检测到 {} 张人脸", faces.len());

    Ok(faces)
  }
}
