// 该文件是 Headcount （人头数） 项目的一部分。
// src/event.rs - 事件循环消息
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

use std::{fmt, sync::mpsc};

use image::RgbaImage;

use crate::{
  acquisition::AcquisitionResult,
  detector::{DetectError, DetectedFace},
  reference::ImageReference,
};

/// 一次采集周期的编号，单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleId(pub u64);

impl fmt::Display for CycleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// 检测器回调携带的结果
#[derive(Debug)]
pub struct Detection {
  pub cycle: CycleId,
  pub reference: ImageReference,
  /// 送入检测器的 32 位图像，用于预览输出
  pub image: RgbaImage,
  pub outcome: Result<Vec<DetectedFace>, DetectError>,
}

/// 所有回到界面线程的消息
#[derive(Debug)]
pub enum Event {
  /// 用户输入的一行命令
  Input(String),
  /// 图库或摄像头活动返回
  Acquired(AcquisitionResult),
  /// 权限请求对话框的结果
  PermissionResult(bool),
  /// 检测器异步返回
  Detected(Box<Detection>),
  Quit,
}

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
  mpsc::channel()
}
