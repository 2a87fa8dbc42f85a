// 该文件是 Headcount （人头数） 项目的一部分。
// src/decoder.rs - 图像解码
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

use std::{fs::File, io::BufReader};

use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};
use thiserror::Error;
use tracing::{debug, error};

use crate::reference::{ImageReference, ReferenceError};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("引用错误: {0}")]
  ReferenceError(#[from] ReferenceError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
  /// 按 EXIF 方向信息旋转；默认关闭，解码尺寸与源文件一致
  pub fix_orientation: bool,
}

/// 内存中的光栅图像
#[derive(Debug, Clone)]
pub struct DecodedImage {
  image: DynamicImage,
}

impl From<DynamicImage> for DecodedImage {
  fn from(image: DynamicImage) -> Self {
    Self { image }
  }
}

impl DecodedImage {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn color(&self) -> ColorType {
    self.image.color()
  }

  pub fn image(&self) -> &DynamicImage {
    &self.image
  }
}

pub fn decode(reference: &ImageReference) -> Option<DecodedImage> {
  decode_with(reference, DecodeOptions::default())
}

/// 解码失败时记录日志并返回 None，错误不会继续向上传播
pub fn decode_with(reference: &ImageReference, options: DecodeOptions) -> Option<DecodedImage> {
  match try_decode(reference, options) {
    Ok(image) => Some(image),
    Err(e) => {
      error!("无法解码 {}: {}", reference, e);
      None
    }
  }
}

pub fn try_decode(
  reference: &ImageReference,
  options: DecodeOptions,
) -> Result<DecodedImage, DecodeError> {
  let path = reference.to_path()?;

  // 只读句柄在本作用域结束时释放，无论解码成功与否
  let image = {
    let file = File::open(&path)?;
    let mut decoder = ImageReader::new(BufReader::new(file))
      .with_guessed_format()?
      .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    if options.fix_orientation {
      image.apply_orientation(orientation);
    }
    image
  };

  debug!(
    "解码完成 {}: {}x{} {:?}",
    reference,
    image.width(),
    image.height(),
    image.color()
  );

  Ok(DecodedImage { image })
}
