// 该文件是 Headcount （人头数） 项目的一部分。
// src/permission.rs - 摄像头权限
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
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  event::{Event, EventSender},
};

pub const PERMISSION_GRANTED: &str = "Permission Granted";
pub const PERMISSION_DENIED: &str = "Permission Denied";
pub const PERMISSION_REQUIRED: &str = "Camera permission is required to take a photo";
pub const RATIONALE_ACTION: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
  #[default]
  Unknown,
  Granted,
  Denied,
}

/// 宿主系统的权限接口
pub trait PermissionHost {
  /// 当前是否已授予摄像头权限
  fn check(&self) -> bool;

  /// 用户曾经拒绝过，但仍可再次询问
  fn should_show_rationale(&self) -> bool;

  /// 发起权限请求；结果通过 `Event::PermissionResult` 异步送回
  fn request(&mut self, reply: EventSender);

  /// 对话框打开期间的用户输入，返回 true 表示已被对话框消费
  fn dialog_input(&mut self, _line: &str) -> bool {
    false
  }
}

/// `ensure` 之后界面需要执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
  AlreadyGranted,
  ShowRationale,
  Request,
}

#[derive(Debug, Default)]
pub struct PermissionGate {
  state: PermissionState,
  rationale_pending: bool,
}

impl PermissionGate {
  pub fn state(&self) -> PermissionState {
    self.state
  }

  pub fn is_granted(&self) -> bool {
    self.state == PermissionState::Granted
  }

  pub fn rationale_pending(&self) -> bool {
    self.rationale_pending
  }

  pub fn ensure(&mut self, host: &dyn PermissionHost) -> GateAction {
    if host.check() {
      self.state = PermissionState::Granted;
      self.rationale_pending = false;
      return GateAction::AlreadyGranted;
    }

    if host.should_show_rationale() {
      self.rationale_pending = true;
      return GateAction::ShowRationale;
    }

    GateAction::Request
  }

  /// 用户在说明提示上点了 "OK"；没有待确认的提示时返回 None
  pub fn acknowledge_rationale(&mut self) -> Option<GateAction> {
    if !self.rationale_pending {
      return None;
    }
    self.rationale_pending = false;
    Some(GateAction::Request)
  }

  /// 权限对话框回调，返回需要展示给用户的消息
  pub fn on_result(&mut self, granted: bool) -> &'static str {
    if granted {
      info!("Permission: Granted");
      self.state = PermissionState::Granted;
      PERMISSION_GRANTED
    } else {
      info!("Permission: Denied");
      self.state = PermissionState::Denied;
      PERMISSION_DENIED
    }
  }
}

#[derive(Error, Debug)]
pub enum PermissionHostError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 以 V4L2 设备节点为对象的终端权限宿主
///
/// 同意与否由终端对话框决定；设备存在但当前用户无读写权限时，请求直接被拒绝。
/// 设备不存在不影响授权，摄像头启动时再报告。
pub struct DevicePermissionHost {
  device: PathBuf,
  consent: Option<bool>,
  pending: Option<EventSender>,
}

impl FromUrlWithScheme for DevicePermissionHost {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for DevicePermissionHost {
  type Error = PermissionHostError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PermissionHostError::SchemeMismatch(url.scheme().to_string()));
    }

    let device = if url.path().is_empty() {
      PathBuf::from("/dev/video0")
    } else {
      PathBuf::from(url.path())
    };
    Ok(Self::new(device))
  }
}

impl DevicePermissionHost {
  pub fn new(device: impl Into<PathBuf>) -> Self {
    Self {
      device: device.into(),
      consent: None,
      pending: None,
    }
  }

  fn device_accessible(device: &Path) -> bool {
    if !device.exists() {
      return true;
    }
    OpenOptions::new()
      .read(true)
      .write(true)
      .open(device)
      .is_ok()
  }
}

impl PermissionHost for DevicePermissionHost {
  fn check(&self) -> bool {
    self.consent == Some(true)
  }

  fn should_show_rationale(&self) -> bool {
    self.consent == Some(false)
  }

  fn request(&mut self, reply: EventSender) {
    if !Self::device_accessible(&self.device) {
      warn!("当前用户无法读写设备: {}", self.device.display());
      self.consent = Some(false);
      if reply.send(Event::PermissionResult(false)).is_err() {
        error!("事件通道已关闭，丢弃权限结果");
      }
      return;
    }

    print!(
      "Allow headcount to use the camera ({})? [yes/no] ",
      self.device.display()
    );
    let _ = std::io::stdout().flush();
    self.pending = Some(reply);
  }

  fn dialog_input(&mut self, line: &str) -> bool {
    let Some(reply) = self.pending.take() else {
      return false;
    };

    let granted = matches!(line.trim().to_lowercase().as_str(), "y" | "yes");
    self.consent = Some(granted);
    if reply.send(Event::PermissionResult(granted)).is_err() {
      error!("事件通道已关闭，丢弃权限结果");
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Fixed {
    granted: bool,
    rationale: bool,
  }

  impl PermissionHost for Fixed {
    fn check(&self) -> bool {
      self.granted
    }

    fn should_show_rationale(&self) -> bool {
      self.rationale
    }

    fn request(&mut self, _reply: EventSender) {}
  }

  #[test]
  fn granted_host_marks_state() {
    let mut gate = PermissionGate::default();
    let host = Fixed {
      granted: true,
      rationale: true,
    };
    assert_eq!(gate.ensure(&host), GateAction::AlreadyGranted);
    assert!(gate.is_granted());
    assert!(!gate.rationale_pending());
  }

  #[test]
  fn rationale_needs_acknowledgement_before_request() {
    let mut gate = PermissionGate::default();
    let host = Fixed {
      granted: false,
      rationale: true,
    };
    assert_eq!(gate.acknowledge_rationale(), None);
    assert_eq!(gate.ensure(&host), GateAction::ShowRationale);
    assert_eq!(gate.state(), PermissionState::Unknown);
    assert_eq!(gate.acknowledge_rationale(), Some(GateAction::Request));
    assert_eq!(gate.acknowledge_rationale(), None);
  }

  #[test]
  fn callback_sets_state() {
    let mut gate = PermissionGate::default();
    let host = Fixed {
      granted: false,
      rationale: false,
    };
    assert_eq!(gate.ensure(&host), GateAction::Request);
    assert_eq!(gate.on_result(false), PERMISSION_DENIED);
    assert_eq!(gate.state(), PermissionState::Denied);
    assert_eq!(gate.on_result(true), PERMISSION_GRANTED);
    assert!(gate.is_granted());
  }

  #[test]
  fn device_host_dialog_flow() {
    let (tx, rx) = crate::event::channel();
    let mut host = DevicePermissionHost::new("/nonexistent/video-device");
    assert!(!host.check());
    assert!(!host.dialog_input("yes"));

    host.request(tx.clone());
    assert!(host.dialog_input("no"));
    assert!(matches!(rx.try_recv(), Ok(Event::PermissionResult(false))));
    assert!(host.should_show_rationale());

    host.request(tx);
    assert!(host.dialog_input("Yes"));
    assert!(matches!(rx.try_recv(), Ok(Event::PermissionResult(true))));
    assert!(host.check());
  }
}
