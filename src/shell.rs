// 该文件是 Headcount （人头数） 项目的一部分。
// src/shell.rs - 界面外壳与事件分发
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

use std::{ops::ControlFlow, path::PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  acquisition::{
    AcquisitionKind, AcquisitionResult, CameraActivity, CaptureTarget, GalleryPicker,
    default_pictures_dir,
  },
  decoder::{self, DecodeOptions},
  detector::{DetectError, DetectedFace},
  display::{self, CountLabel, DetectionClient, Notifier},
  event::{CycleId, Detection, Event, EventReceiver, EventSender},
  output::Preview,
  permission::{
    GateAction, PERMISSION_GRANTED, PERMISSION_REQUIRED, PermissionGate, PermissionHost,
    RATIONALE_ACTION,
  },
  reference::ImageReference,
};

pub const DECODE_FAILED: &str = "Unable to read the selected image";
const HELP: &str = "commands: gallery <path>, camera, ok, status, help, quit";

#[derive(Error, Debug)]
pub enum ShellError {
  #[error("缺少组件: {0}")]
  Missing(&'static str),
}

/// 单个采集周期的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
  Acquiring,
  Decoding,
  Detecting,
  Displayed,
  Failed,
}

/// 贯穿 采集 → 解码 → 检测 的周期上下文
#[derive(Debug, Clone)]
pub struct CycleContext {
  pub id: CycleId,
  pub kind: AcquisitionKind,
  pub reference: Option<ImageReference>,
  pub state: CycleState,
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
  pub pictures_dir: PathBuf,
  pub decode: DecodeOptions,
  /// 丢弃过期周期的检测结果（最后一次请求生效）；默认最后完成的回调生效
  pub discard_stale: bool,
  /// 每次显示结果时输出一行 JSON
  pub report_json: bool,
}

impl Default for ShellConfig {
  fn default() -> Self {
    Self {
      pictures_dir: default_pictures_dir(),
      decode: DecodeOptions::default(),
      discard_stale: false,
      report_json: false,
    }
  }
}

#[derive(Default)]
pub struct ShellBuilder {
  host: Option<Box<dyn PermissionHost>>,
  gallery: Option<Box<dyn GalleryPicker>>,
  camera: Option<Box<dyn CameraActivity>>,
  detection: Option<DetectionClient>,
  label: Option<Box<dyn CountLabel>>,
  notifier: Option<Box<dyn Notifier>>,
  preview: Option<Preview>,
  config: ShellConfig,
}

impl ShellBuilder {
  pub fn permission_host(mut self, host: impl PermissionHost + 'static) -> Self {
    self.host = Some(Box::new(host));
    self
  }

  pub fn gallery(mut self, gallery: impl GalleryPicker + 'static) -> Self {
    self.gallery = Some(Box::new(gallery));
    self
  }

  pub fn camera(mut self, camera: impl CameraActivity + 'static) -> Self {
    self.camera = Some(Box::new(camera));
    self
  }

  pub fn detection(mut self, detection: DetectionClient) -> Self {
    self.detection = Some(detection);
    self
  }

  pub fn label(mut self, label: impl CountLabel + 'static) -> Self {
    self.label = Some(Box::new(label));
    self
  }

  pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
    self.notifier = Some(Box::new(notifier));
    self
  }

  pub fn preview(mut self, preview: Option<Preview>) -> Self {
    self.preview = preview;
    self
  }

  pub fn config(mut self, config: ShellConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self, events: EventSender) -> Result<Shell, ShellError> {
    Ok(Shell {
      host: self.host.ok_or(ShellError::Missing("permission host"))?,
      gallery: self.gallery.ok_or(ShellError::Missing("gallery"))?,
      camera: self.camera.ok_or(ShellError::Missing("camera"))?,
      detection: self.detection.ok_or(ShellError::Missing("detector"))?,
      label: self.label.ok_or(ShellError::Missing("label"))?,
      notifier: self.notifier.ok_or(ShellError::Missing("notifier"))?,
      preview: self.preview,
      config: self.config,
      gate: PermissionGate::default(),
      current: None,
      next_cycle: 1,
      events,
    })
  }
}

/// 单线程事件循环；所有状态只在这里修改
pub struct Shell {
  host: Box<dyn PermissionHost>,
  gallery: Box<dyn GalleryPicker>,
  camera: Box<dyn CameraActivity>,
  detection: DetectionClient,
  label: Box<dyn CountLabel>,
  notifier: Box<dyn Notifier>,
  preview: Option<Preview>,
  config: ShellConfig,
  gate: PermissionGate,
  current: Option<CycleContext>,
  next_cycle: u64,
  events: EventSender,
}

impl Shell {
  pub fn builder() -> ShellBuilder {
    ShellBuilder::default()
  }

  pub fn gate(&self) -> &PermissionGate {
    &self.gate
  }

  pub fn current(&self) -> Option<&CycleContext> {
    self.current.as_ref()
  }

  pub fn label_text(&self) -> &str {
    self.label.text()
  }

  /// 启动时先检查一次摄像头权限
  pub fn start(&mut self) {
    info!("启动 headcount");
    self.ensure_camera_permission();
  }

  pub fn run(&mut self, events: EventReceiver) {
    for event in events {
      if self.handle(event).is_break() {
        break;
      }
    }
    info!("事件循环结束");
  }

  /// 当前周期已显示结果或已失败
  pub fn is_settled(&self) -> bool {
    self
      .current
      .as_ref()
      .is_none_or(|c| matches!(c.state, CycleState::Displayed | CycleState::Failed))
  }

  /// 处理事件直到当前周期结束，用于单次运行
  pub fn run_until_settled(&mut self, events: EventReceiver) {
    if self.is_settled() {
      return;
    }
    for event in events {
      if self.handle(event).is_break() || self.is_settled() {
        break;
      }
    }
  }

  pub fn handle(&mut self, event: Event) -> ControlFlow<()> {
    match event {
      Event::Input(line) => return self.on_input(&line),
      Event::Acquired(result) => self.on_acquired(result),
      Event::PermissionResult(granted) => {
        let message = self.gate.on_result(granted);
        self.notifier.show(message);
      }
      Event::Detected(detection) => self.on_detected(*detection),
      Event::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
  }

  fn on_input(&mut self, line: &str) -> ControlFlow<()> {
    if self.host.dialog_input(line) {
      return ControlFlow::Continue(());
    }

    let line = line.trim();
    let (command, argument) = match line.split_once(char::is_whitespace) {
      Some((command, argument)) => (command, Some(argument.trim())),
      None => (line, None),
    };

    match command.to_lowercase().as_str() {
      "" => {}
      "gallery" | "g" => self.launch_gallery(argument),
      "camera" | "c" => self.on_camera_clicked(),
      "ok" => self.acknowledge_rationale(),
      "status" => self.report_status(),
      "help" | "?" => self.notifier.show(HELP),
      "quit" | "exit" | "q" => return ControlFlow::Break(()),
      other => {
        warn!("未知命令: {}", other);
        self.notifier.show(&format!("unknown command '{}'; {}", other, HELP));
      }
    }
    ControlFlow::Continue(())
  }

  fn ensure_camera_permission(&mut self) {
    match self.gate.ensure(self.host.as_ref()) {
      GateAction::AlreadyGranted => self.notifier.show(PERMISSION_GRANTED),
      GateAction::ShowRationale => {
        self
          .notifier
          .show_with_action(PERMISSION_REQUIRED, RATIONALE_ACTION);
      }
      GateAction::Request => self.host.request(self.events.clone()),
    }
  }

  fn acknowledge_rationale(&mut self) {
    if self.gate.acknowledge_rationale().is_some() {
      self.host.request(self.events.clone());
    } else {
      debug!("没有待确认的权限说明");
    }
  }

  /// 新周期替换旧周期；旧周期的解码结果与检测结果随之失效
  fn begin_cycle(&mut self, kind: AcquisitionKind) -> CycleId {
    let id = CycleId(self.next_cycle);
    self.next_cycle += 1;
    if let Some(previous) = self.current.as_ref()
      && !matches!(previous.state, CycleState::Displayed | CycleState::Failed)
    {
      info!("周期 {} 被 {} 取代 ({:?})", previous.id, id, previous.state);
    }
    self.current = Some(CycleContext {
      id,
      kind,
      reference: None,
      state: CycleState::Acquiring,
    });
    id
  }

  fn launch_gallery(&mut self, selection: Option<&str>) {
    let cycle = self.begin_cycle(AcquisitionKind::Gallery);
    info!("打开图库 {}", cycle);
    self.gallery.launch(cycle, selection, self.events.clone());
  }

  fn on_camera_clicked(&mut self) {
    if self.gate.is_granted() {
      self.launch_camera();
    } else {
      self.ensure_camera_permission();
    }
  }

  fn launch_camera(&mut self) {
    let cycle = self.begin_cycle(AcquisitionKind::Camera);
    let target = match CaptureTarget::allocate(&self.config.pictures_dir) {
      Ok(target) => target,
      Err(e) => {
        self.fail(cycle, &e.to_string());
        return;
      }
    };

    if let Some(context) = self.current.as_mut() {
      context.reference = Some(target.reference().clone());
    }

    match self.camera.launch(cycle, &target, self.events.clone()) {
      Ok(()) => info!("等待拍摄结果 {}", cycle),
      Err(e) => {
        target.discard();
        self.fail(cycle, &e.to_string());
      }
    }
  }

  fn fail(&mut self, cycle: CycleId, message: &str) {
    error!("周期 {} 失败: {}", cycle, message);
    if let Some(context) = self.current.as_mut()
      && context.id == cycle
    {
      context.state = CycleState::Failed;
    }
    self.notifier.show(message);
  }

  fn is_current(&self, cycle: CycleId) -> bool {
    self.current.as_ref().is_some_and(|c| c.id == cycle)
  }

  fn set_state(&mut self, cycle: CycleId, state: CycleState) {
    if let Some(context) = self.current.as_mut()
      && context.id == cycle
    {
      context.state = state;
    }
  }

  fn on_acquired(&mut self, result: AcquisitionResult) {
    let cycle = result.cycle();
    result.discard_unused_capture();
    if !self.is_current(cycle) {
      warn!("忽略过期周期 {} 的 {} 结果", cycle, result.kind());
      return;
    }

    let reference = match result.into_reference() {
      Ok(reference) => reference,
      Err(code) => {
        self.fail(cycle, &format!("sorry {}", code));
        return;
      }
    };

    if let Some(context) = self.current.as_mut() {
      context.reference = Some(reference.clone());
      context.state = CycleState::Decoding;
    }

    let Some(image) = decoder::decode_with(&reference, self.config.decode) else {
      self.fail(cycle, DECODE_FAILED);
      return;
    };

    self.set_state(cycle, CycleState::Detecting);
    let normalized = display::normalize(&image);
    self
      .detection
      .process(cycle, reference, normalized, self.events.clone());
  }

  fn on_detected(&mut self, detection: Detection) {
    let Detection {
      cycle,
      reference,
      image,
      outcome,
    } = detection;

    let current = self.is_current(cycle);
    if !current {
      if self.config.discard_stale {
        warn!("丢弃过期周期 {} 的检测结果", cycle);
        return;
      }
      warn!("过期周期 {} 的检测结果仍然写入标签", cycle);
    }

    match display::apply_outcome(&outcome, self.label.as_mut(), self.notifier.as_mut()) {
      Some(count) => {
        if current {
          self.set_state(cycle, CycleState::Displayed);
        }
        if let (Some(preview), Ok(faces)) = (self.preview.as_ref(), outcome.as_ref()) {
          preview.render_or_warn(&image, faces);
        }
        if self.config.report_json {
          self.report_json(cycle, &reference, count, &outcome);
        }
      }
      None => {
        if current {
          self.set_state(cycle, CycleState::Failed);
        }
      }
    }
  }

  fn report_json(
    &self,
    cycle: CycleId,
    reference: &ImageReference,
    count: usize,
    outcome: &Result<Vec<DetectedFace>, DetectError>,
  ) {
    let faces: Vec<serde_json::Value> = outcome
      .as_ref()
      .map(|faces| {
        faces
          .iter()
          .map(|face| {
            serde_json::json!({
              "bbox": face.bbox,
              "score": face.score,
              "tracking_id": face.tracking_id,
            })
          })
          .collect()
      })
      .unwrap_or_default();

    let line = serde_json::json!({
      "cycle": cycle.0,
      "source": reference.to_string(),
      "count": count,
      "faces": faces,
    });
    println!("{}", line);
  }

  fn report_status(&mut self) {
    let status = match self.current.as_ref() {
      Some(context) => format!(
        "cycle {} ({}) {:?}: {}; permission {:?}",
        context.id,
        context.kind,
        context.state,
        context
          .reference
          .as_ref()
          .map(ToString::to_string)
          .unwrap_or_else(|| "-".to_string()),
        self.gate.state()
      ),
      None => format!("idle; permission {:?}", self.gate.state()),
    };
    self.notifier.show(&status);
  }
}
