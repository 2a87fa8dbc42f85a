// 该文件是 Headcount （人头数） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{io::BufRead, sync::Arc, thread};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use headcount::{
  FromUrl,
  acquisition::{PathGalleryPicker, default_pictures_dir},
  decoder::DecodeOptions,
  detector::{DetectorOptions, PerformanceMode, RustfaceDetectorBuilder},
  display::{DetectionClient, TerminalLabel, TerminalNotifier},
  event::{self, Event, EventSender},
  output::Preview,
  permission::DevicePermissionHost,
  shell::{Shell, ShellConfig},
};

use args::{Args, Report};

#[cfg(feature = "v4l_camera")]
fn camera(args: &Args) -> Result<headcount::acquisition::V4lCamera> {
  Ok(headcount::acquisition::V4lCamera::from_url(&args.camera)?)
}

#[cfg(not(feature = "v4l_camera"))]
fn camera(_args: &Args) -> Result<headcount::acquisition::MissingCamera> {
  tracing::warn!("未启用 v4l_camera 特性，摄像头不可用");
  Ok(headcount::acquisition::MissingCamera)
}

/// 标准输入的每一行都作为一次界面操作送入事件循环
fn spawn_input(events: EventSender) {
  thread::spawn(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let Ok(line) = line else {
        break;
      };
      if events.send(Event::Input(line)).is_err() {
        return;
      }
    }
    let _ = events.send(Event::Quit);
  });
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("摄像头: {}", args.camera);

  let options = DetectorOptions {
    mode: if args.fast {
      PerformanceMode::Fast
    } else {
      PerformanceMode::Accurate
    },
    tracking: !args.no_tracking,
  };
  let detector = RustfaceDetectorBuilder::from_url(&args.model)?
    .options(options)
    .build()?;

  let preview = args.preview.as_ref().map(Preview::from_url).transpose()?;
  let config = ShellConfig {
    pictures_dir: args.pictures_dir.clone().unwrap_or_else(default_pictures_dir),
    decode: DecodeOptions {
      fix_orientation: args.fix_orientation,
    },
    discard_stale: args.discard_stale,
    report_json: args.report == Report::Json,
  };
  info!("照片目录: {}", config.pictures_dir.display());

  let (tx, rx) = event::channel();
  let mut shell = Shell::builder()
    .permission_host(DevicePermissionHost::from_url(&args.camera)?)
    .gallery(PathGalleryPicker)
    .camera(camera(&args)?)
    .detection(DetectionClient::new(Arc::new(detector)))
    .label(TerminalLabel::default())
    .notifier(TerminalNotifier)
    .preview(preview)
    .config(config)
    .build(tx.clone())?;

  let interrupt = tx.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = interrupt.send(Event::Quit);
  })?;

  if let Some(image) = args.once.as_deref() {
    let _ = shell.handle(Event::Input(format!("gallery {}", image)));
    shell.run_until_settled(rx);
    return Ok(());
  }

  shell.start();
  spawn_input(tx);
  shell.run(rx);

  Ok(())
}
