// 该文件是 Headcount （人头数） 项目的一部分。
// src/acquisition/v4l_camera.rs - V4L2 摄像头拍摄
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
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  thread,
};

use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  prelude::*,
  video::Capture,
};

use super::{AcquisitionError, AcquisitionResult, CameraActivity, CaptureTarget, ResultCode};
use crate::{
  FromUrl, FromUrlWithScheme,
  event::{CycleId, Event, EventSender},
};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;
// 前几帧曝光尚未稳定
const WARMUP_FRAMES: usize = 3;
const JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum V4lCameraError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image encoding error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Captured buffer size mismatch")]
  BufferMismatch,
}

/// 通过 V4L2 设备拍摄单张照片
pub struct V4lCamera {
  device_path: PathBuf,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = V4lCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lCameraError::SchemaMismatch);
    }

    // v4l:///dev/video0
    let device_path = if url.path().is_empty() {
      PathBuf::from("/dev/video0")
    } else {
      PathBuf::from(url.path())
    };

    Ok(V4lCamera { device_path })
  }
}

impl V4lCamera {
  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks(4) {
      if chunk.len() < 4 {
        break;
      }

      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }

  fn capture(device_path: &Path, target: &CaptureTarget) -> Result<(), V4lCameraError> {
    let device = Device::with_path(device_path)?;

    let mut format = device.format()?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;

    let mut stream = Stream::with_buffers(&device, Type::VideoCapture, CAPTURE_BUFFERS)?;
    for _ in 0..WARMUP_FRAMES {
      stream.next()?;
    }
    let (buffer, _meta) = stream.next()?;

    let mut writer = BufWriter::new(target.provide()?);
    match &format.fourcc.repr {
      b"YUYV" => {
        let rgb = Self::yuyv_to_rgb(buffer, format.width, format.height);
        let image = RgbImage::from_raw(format.width, format.height, rgb)
          .ok_or(V4lCameraError::BufferMismatch)?;
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&image)?;
      }
      // 设备直接输出 JPEG
      b"MJPG" => writer.write_all(buffer)?,
      other => {
        return Err(V4lCameraError::UnsupportedPixelFormat(
          String::from_utf8_lossy(other).into_owned(),
        ));
      }
    }
    writer.flush()?;

    Ok(())
  }
}

impl CameraActivity for V4lCamera {
  fn launch(
    &mut self,
    cycle: CycleId,
    target: &CaptureTarget,
    reply: EventSender,
  ) -> Result<(), AcquisitionError> {
    if !self.device_path.exists() {
      return Err(AcquisitionError::NoCameraApp(
        self.device_path.display().to_string(),
      ));
    }

    let device_path = self.device_path.clone();
    let target = target.clone();
    info!("启动拍摄 {}: {}", cycle, device_path.display());
    thread::spawn(move || {
      let code = match Self::capture(&device_path, &target) {
        Ok(()) => {
          info!("拍摄完成: {}", target.path().display());
          ResultCode::Ok
        }
        Err(e) => {
          warn!("拍摄失败: {}", e);
          ResultCode::Failed(e.to_string())
        }
      };

      let result = AcquisitionResult::Camera {
        cycle,
        code,
        target: target.reference().clone(),
      };
      if reply.send(Event::Acquired(result)).is_err() {
        error!("事件通道已关闭，丢弃拍摄结果");
      }
    });

    Ok(())
  }
}
