// 该文件是 Headcount （人头数） 项目的一部分。
// src/acquisition.rs - 图像采集
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
  fmt,
  fs::{File, OpenOptions},
  io,
  path::{Path, PathBuf},
};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  event::{CycleId, EventSender},
  reference::{ImageReference, ReferenceError},
};

mod gallery;
pub use self::gallery::PathGalleryPicker;

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::{V4lCamera, V4lCameraError};

pub const FILE_NAME: &str = "photo.jpg";
pub const FILE_SUFFIX: &str = ".jpg";
const MAX_ALLOCATE_ATTEMPTS: u32 = 64;

#[derive(Error, Debug)]
pub enum AcquisitionError {
  #[error("没有可用的摄像头: {0}")]
  NoCameraApp(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] io::Error),
  #[error("引用错误: {0}")]
  ReferenceError(#[from] ReferenceError),
  #[error("无法分配唯一的拍摄文件: {0}")]
  Exhausted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionKind {
  Gallery,
  Camera,
}

impl fmt::Display for AcquisitionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AcquisitionKind::Gallery => write!(f, "gallery"),
      AcquisitionKind::Camera => write!(f, "camera"),
    }
  }
}

/// 外部活动的返回码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCode {
  Ok,
  Canceled,
  Failed(String),
}

impl fmt::Display for ResultCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ResultCode::Ok => write!(f, "ok"),
      ResultCode::Canceled => write!(f, "canceled"),
      ResultCode::Failed(reason) => write!(f, "failed: {}", reason),
    }
  }
}

/// 采集结果，按来源打上标签并各自携带引用
#[derive(Debug, Clone)]
pub enum AcquisitionResult {
  Gallery {
    cycle: CycleId,
    code: ResultCode,
    reference: Option<ImageReference>,
  },
  /// 摄像头只返回结果码，图像已写入预先分配的位置
  Camera {
    cycle: CycleId,
    code: ResultCode,
    target: ImageReference,
  },
}

impl AcquisitionResult {
  pub fn cycle(&self) -> CycleId {
    match self {
      AcquisitionResult::Gallery { cycle, .. } | AcquisitionResult::Camera { cycle, .. } => *cycle,
    }
  }

  pub fn kind(&self) -> AcquisitionKind {
    match self {
      AcquisitionResult::Gallery { .. } => AcquisitionKind::Gallery,
      AcquisitionResult::Camera { .. } => AcquisitionKind::Camera,
    }
  }

  pub fn code(&self) -> &ResultCode {
    match self {
      AcquisitionResult::Gallery { code, .. } | AcquisitionResult::Camera { code, .. } => code,
    }
  }

  /// 摄像头未成功返回时删除预先分配的空文件
  pub fn discard_unused_capture(&self) {
    let AcquisitionResult::Camera { code, target, .. } = self else {
      return;
    };
    if *code == ResultCode::Ok {
      return;
    }

    match target.to_path() {
      Ok(path) => match std::fs::remove_file(&path) {
        Ok(()) => info!("已清理未使用的拍摄文件: {}", path.display()),
        Err(e) => debug!("清理拍摄文件失败 {}: {}", path.display(), e),
      },
      Err(e) => debug!("无法定位拍摄文件 {}: {}", target, e),
    }
  }

  /// 成功时得到新的图像引用
  pub fn into_reference(self) -> Result<ImageReference, ResultCode> {
    match self {
      AcquisitionResult::Gallery {
        code: ResultCode::Ok,
        reference: Some(reference),
        ..
      } => Ok(reference),
      AcquisitionResult::Gallery {
        code: ResultCode::Ok,
        reference: None,
        ..
      } => Err(ResultCode::Canceled),
      AcquisitionResult::Camera {
        code: ResultCode::Ok,
        target,
        ..
      } => Ok(target),
      AcquisitionResult::Gallery { code, .. } | AcquisitionResult::Camera { code, .. } => Err(code),
    }
  }
}

/// 图库选择器，只提供图像类内容
pub trait GalleryPicker {
  /// 启动选择器；`selection` 为用户在选择器中选中的条目。结果通过事件通道返回。
  fn launch(&mut self, cycle: CycleId, selection: Option<&str>, reply: EventSender);
}

/// 摄像头拍摄活动
pub trait CameraActivity {
  /// 启动拍摄并立即返回；设备上没有摄像头时返回 `NoCameraApp`
  fn launch(
    &mut self,
    cycle: CycleId,
    target: &CaptureTarget,
    reply: EventSender,
  ) -> Result<(), AcquisitionError>;
}

/// 没有任何摄像头的宿主
#[derive(Debug, Default)]
pub struct MissingCamera;

impl CameraActivity for MissingCamera {
  fn launch(
    &mut self,
    _cycle: CycleId,
    _target: &CaptureTarget,
    _reply: EventSender,
  ) -> Result<(), AcquisitionError> {
    Err(AcquisitionError::NoCameraApp(
      "No activity found to handle image capture".to_string(),
    ))
  }
}

/// 预先分配的拍摄目标文件
///
/// 摄像头只拿到 `provide` 打开的写入句柄，不接触图片目录本身。
#[derive(Debug, Clone)]
pub struct CaptureTarget {
  path: PathBuf,
  reference: ImageReference,
}

impl CaptureTarget {
  /// 在 `directory` 下创建 `photo.jpg<后缀>.jpg`，与已有文件不会冲突
  pub fn allocate(directory: &Path) -> Result<Self, AcquisitionError> {
    std::fs::create_dir_all(directory)?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    for attempt in 0..MAX_ALLOCATE_ATTEMPTS {
      let name = format!("{}{}{:02}{}", FILE_NAME, stamp, attempt, FILE_SUFFIX);
      let path = directory.join(name);
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(_) => {
          debug!("分配拍摄文件: {}", path.display());
          let reference = ImageReference::from_path(&path)?;
          return Ok(CaptureTarget { path, reference });
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
        Err(e) => return Err(e.into()),
      }
    }

    Err(AcquisitionError::Exhausted(directory.display().to_string()))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn reference(&self) -> &ImageReference {
    &self.reference
  }

  /// 交给摄像头的只写句柄
  pub fn provide(&self) -> io::Result<File> {
    OpenOptions::new()
      .write(true)
      .truncate(true)
      .open(&self.path)
  }

  /// 拍摄失败时清理空文件
  pub fn discard(self) {
    if let Err(e) = std::fs::remove_file(&self.path) {
      debug!("清理拍摄文件失败 {}: {}", self.path.display(), e);
    } else {
      info!("已清理未使用的拍摄文件: {}", self.path.display());
    }
  }
}

/// 应用的图片目录：`$XDG_PICTURES_DIR` 或 `~/Pictures` 下的 headcount 子目录
pub fn default_pictures_dir() -> PathBuf {
  let base = std::env::var_os("XDG_PICTURES_DIR")
    .map(PathBuf::from)
    .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join("Pictures")))
    .unwrap_or_else(std::env::temp_dir);
  base.join("headcount")
}
