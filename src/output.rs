// 该文件是 Headcount （人头数） 项目的一部分。
// src/output.rs - 预览图像输出
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

use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detector::DetectedFace};

const BOX_COLOR: [u8; 3] = [255, 0, 0];
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum PreviewError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效路径: {0}")]
  InvalidPath(String),
}

/// 把当前显示的图像连同人脸框保存到文件，相当于界面上的图像视图
pub struct Preview {
  path: PathBuf,
}

impl FromUrlWithScheme for Preview {
  const SCHEME: &'static str = "image";
}

impl FromUrl for Preview {
  type Error = PreviewError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(PreviewError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = urlencoding::decode(uri.path())
      .map_err(|e| PreviewError::InvalidPath(e.to_string()))?
      .into_owned();

    Ok(Preview {
      path: PathBuf::from(path),
    })
  }
}

impl Preview {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn draw(image: &RgbaImage, faces: &[DetectedFace]) -> RgbImage {
    let mut canvas = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);

    for face in faces {
      let x_min = (face.bbox[0].floor() as i32).clamp(0, w - 1);
      let y_min = (face.bbox[1].floor() as i32).clamp(0, h - 1);
      let x_max = (face.bbox[2].ceil() as i32).clamp(0, w - 1);
      let y_max = (face.bbox[3].ceil() as i32).clamp(0, h - 1);
      if x_min >= x_max || y_min >= y_max {
        continue;
      }

      for t in 0..BOX_THICKNESS {
        let width = x_max - x_min - 2 * t;
        let height = y_max - y_min - 2 * t;
        if width <= 0 || height <= 0 {
          break;
        }
        let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(&mut canvas, rect, Rgb(BOX_COLOR));
      }
    }

    canvas
  }

  pub fn render(&self, image: &RgbaImage, faces: &[DetectedFace]) -> Result<(), PreviewError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    Self::draw(image, faces).save(&self.path)?;
    info!("保存预览到文件: {}", self.path.display());
    Ok(())
  }

  /// 渲染失败只记录日志
  pub fn render_or_warn(&self, image: &RgbaImage, faces: &[DetectedFace]) {
    if let Err(e) = self.render(image, faces) {
      warn!("保存预览失败 {}: {}", self.path.display(), e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgba;

  #[test]
  fn draws_box_outline() {
    let image = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
    let face = DetectedFace {
      bbox: [10.0, 10.0, 30.0, 30.0],
      score: 5.0,
      tracking_id: Some(1),
    };

    let canvas = Preview::draw(&image, &[face]);
    assert_eq!(canvas.get_pixel(10, 10).0, BOX_COLOR);
    assert_eq!(canvas.get_pixel(20, 20).0, [0, 0, 0]);
    assert_eq!(canvas.get_pixel(2, 2).0, [0, 0, 0]);
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      Preview::from_url(&url),
      Err(PreviewError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn percent_encoded_path_is_decoded() {
    let url = Url::parse("image:///tmp/my%20dir/p.png").unwrap();
    let preview = Preview::from_url(&url).unwrap();
    assert_eq!(preview.path(), Path::new("/tmp/my dir/p.png"));
  }
}
