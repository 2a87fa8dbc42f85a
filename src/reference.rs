// 该文件是 Headcount （人头数） 项目的一部分。
// src/reference.rs - 图像引用
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
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

const FILE_SCHEME: &str = "file";

#[derive(Error, Debug)]
pub enum ReferenceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的路径: {0}")]
  InvalidPath(String),
}

/// 指向图像字节的不透明定位符
///
/// 支持 `file://` 与 `image://` 两种方案，后者与输出端的图像方案保持一致。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
  url: Url,
}

impl FromUrlWithScheme for ImageReference {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageReference {
  type Error = ReferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != FILE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}' or '{}', found '{}'",
        Self::SCHEME,
        FILE_SCHEME,
        url.scheme()
      );
      return Err(ReferenceError::SchemeMismatch(url.scheme().to_string()));
    }

    if url.path().is_empty() {
      return Err(ReferenceError::InvalidPath(url.to_string()));
    }

    Ok(ImageReference { url: url.clone() })
  }
}

impl ImageReference {
  /// 由本地路径构造引用，相对路径按当前工作目录展开
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
      path.to_path_buf()
    } else {
      std::env::current_dir()
        .map_err(|_| ReferenceError::InvalidPath(path.display().to_string()))?
        .join(path)
    };

    let url = Url::from_file_path(&absolute)
      .map_err(|_| ReferenceError::InvalidPath(absolute.display().to_string()))?;
    Ok(ImageReference { url })
  }

  /// 解析用户输入：带方案的 URL 或普通路径
  pub fn parse(input: &str) -> Result<Self, ReferenceError> {
    match Url::parse(input) {
      Ok(url) if url.scheme().len() > 1 => Self::from_url(&url),
      _ => Self::from_path(input),
    }
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// 还原为本地路径（百分号编码已解码）
  pub fn to_path(&self) -> Result<PathBuf, ReferenceError> {
    if self.url.scheme() == FILE_SCHEME {
      return self
        .url
        .to_file_path()
        .map_err(|_| ReferenceError::InvalidPath(self.url.to_string()));
    }

    let decoded = urlencoding::decode(self.url.path())
      .map_err(|_| ReferenceError::InvalidPath(self.url.to_string()))?;
    Ok(PathBuf::from(decoded.into_owned()))
  }
}

impl fmt::Display for ImageReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.url)
  }
}
