// 该文件是 Headcount （人头数） 项目的一部分。
// src/display.rs - 人脸计数显示
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
  panic::{self, AssertUnwindSafe},
  sync::Arc,
  thread,
};

use image::RgbaImage;
use tracing::{error, info};

use crate::{
  decoder::DecodedImage,
  detector::{DetectError, DetectedFace, FaceDetector},
  event::{CycleId, Detection, Event, EventSender},
  reference::ImageReference,
};

pub fn face_count_text(count: usize) -> String {
  format!("Face Count = {}", count)
}

/// 显示人脸数量的文本标签
pub trait CountLabel {
  fn set_text(&mut self, text: &str);
  fn text(&self) -> &str;
}

/// 短暂提示消息，可带一个动作按钮
pub trait Notifier {
  fn show(&mut self, message: &str);
  fn show_with_action(&mut self, message: &str, action: &str);
}

#[derive(Debug, Default)]
pub struct TerminalLabel {
  text: String,
}

impl CountLabel for TerminalLabel {
  fn set_text(&mut self, text: &str) {
    self.text = text.to_string();
    println!("{}", self.text);
  }

  fn text(&self) -> &str {
    &self.text
  }
}

#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
  fn show(&mut self, message: &str) {
    eprintln!("» {}", message);
  }

  fn show_with_action(&mut self, message: &str, action: &str) {
    eprintln!("» {} [{}]", message, action);
  }
}

/// 转成检测器需要的 32 位像素格式；源图像不会被修改
pub fn normalize(image: &DecodedImage) -> RgbaImage {
  image.image().to_rgba8()
}

/// 异步调用检测器，结果以 `Event::Detected` 送回事件循环
#[derive(Clone)]
pub struct DetectionClient {
  detector: Arc<dyn FaceDetector>,
}

impl DetectionClient {
  pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
    Self { detector }
  }

  pub fn process(
    &self,
    cycle: CycleId,
    reference: ImageReference,
    image: RgbaImage,
    reply: EventSender,
  ) {
    let detector = Arc::clone(&self.detector);
    thread::spawn(move || {
      info!("开始检测 {}...", cycle);
      let now = std::time::Instant::now();
      let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&image)))
        .unwrap_or_else(|_| Err(DetectError::Internal("检测器崩溃".to_string())));
      info!("检测完成 {}，耗时: {:.2?}", cycle, now.elapsed());

      let detection = Detection {
        cycle,
        reference,
        image,
        outcome,
      };
      if reply.send(Event::Detected(Box::new(detection))).is_err() {
        error!("事件通道已关闭，丢弃检测结果 {}", cycle);
      }
    });
  }
}

/// 把一次检测结果写到标签上；失败时只提示，不改动标签
pub fn apply_outcome(
  outcome: &Result<Vec<DetectedFace>, DetectError>,
  label: &mut dyn CountLabel,
  notifier: &mut dyn Notifier,
) -> Option<usize> {
  match outcome {
    Ok(faces) if faces.is_empty() => {
      label.set_text(&face_count_text(0));
      Some(0)
    }
    Ok(faces) => {
      info!("faces detected: {}", faces.len());
      label.set_text(&face_count_text(faces.len()));
      Some(faces.len())
    }
    Err(e) => {
      error!("检测失败: {}", e);
      notifier.show(&e.to_string());
      None
    }
  }
}
