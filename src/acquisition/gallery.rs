// 该文件是 Headcount （人头数） 项目的一部分。
// src/acquisition/gallery.rs - 图库选择
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

use image::ImageFormat;
use tracing::{error, info, warn};

use super::{AcquisitionResult, GalleryPicker, ResultCode};
use crate::{
  event::{CycleId, Event, EventSender},
  reference::ImageReference,
};

/// 以用户给出的路径或 URL 作为选中项的图库
///
/// 相当于 `image/*` 过滤：扩展名无法识别为图像格式时视为取消。
#[derive(Debug, Default)]
pub struct PathGalleryPicker;

impl PathGalleryPicker {
  fn pick(selection: Option<&str>) -> (ResultCode, Option<ImageReference>) {
    let Some(selection) = selection.map(str::trim).filter(|s| !s.is_empty()) else {
      info!("图库选择被取消");
      return (ResultCode::Canceled, None);
    };

    let reference = match ImageReference::parse(selection) {
      Ok(reference) => reference,
      Err(e) => {
        warn!("无法解析选中项 {}: {}", selection, e);
        return (ResultCode::Failed(e.to_string()), None);
      }
    };

    let is_image = reference
      .to_path()
      .ok()
      .and_then(|path| ImageFormat::from_path(path).ok())
      .is_some();
    if !is_image {
      warn!("选中项不是图像内容: {}", reference);
      return (ResultCode::Canceled, None);
    }

    (ResultCode::Ok, Some(reference))
  }
}

impl GalleryPicker for PathGalleryPicker {
  fn launch(&mut self, cycle: CycleId, selection: Option<&str>, reply: EventSender) {
    let (code, reference) = Self::pick(selection);
    let result = AcquisitionResult::Gallery {
      cycle,
      code,
      reference,
    };
    if reply.send(Event::Acquired(result)).is_err() {
      error!("事件通道已关闭，丢弃图库结果");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn image_extension_is_picked() {
    let (code, reference) = PathGalleryPicker::pick(Some("/tmp/group.JPG"));
    assert_eq!(code, ResultCode::Ok);
    assert!(reference.is_some());
  }

  #[test]
  fn non_image_is_filtered_out() {
    let (code, reference) = PathGalleryPicker::pick(Some("/tmp/notes.txt"));
    assert_eq!(code, ResultCode::Canceled);
    assert!(reference.is_none());
  }

  #[test]
  fn empty_selection_cancels() {
    let (tx, rx) = crate::event::channel();
    PathGalleryPicker.launch(CycleId(7), Some("  "), tx);
    match rx.try_recv() {
      Ok(Event::Acquired(result)) => {
        assert_eq!(result.cycle(), CycleId(7));
        assert_eq!(result.code(), &ResultCode::Canceled);
      }
      other => panic!("unexpected event: {:?}", other),
    }
  }
}
