// 该文件是 Liuguang （流光） 项目的一部分。
// src/input.rs - 视频帧输入源
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

use thiserror::Error;

use crate::{frame::Frame, quality::QualityPreference};

mod resolver;
pub use self::resolver::{ResolveError, StreamResolver, YtDlpResolver};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerOpener};

/// 会话的输入源配置，会话开始后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
  /// 本地默认摄像头
  Local,
  /// 远程视频地址，只能通过 [`SourceConfig::remote`] 构造
  Remote(RemoteSource),
}

impl SourceConfig {
  /// 构造远程输入配置，地址不能为空
  pub fn remote(url: &str, quality: QualityPreference) -> Result<Self, InputError> {
    let url = url.trim();
    if url.is_empty() {
      return Err(InputError::EmptySourceUrl);
    }
    Ok(SourceConfig::Remote(RemoteSource {
      url: url.to_string(),
      quality,
    }))
  }
}

/// 已校验的远程视频地址与画质偏好
///
/// 字段私有，地址保证非空：
///
/// ```compile_fail
/// use liuguang::{input::RemoteSource, quality::QualityPreference};
///
/// let _ = RemoteSource {
///   url: String::new(),
///   quality: QualityPreference::High,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
  url: String,
  quality: QualityPreference,
}

impl RemoteSource {
  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn quality(&self) -> QualityPreference {
    self.quality
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("视频地址不能为空")]
  EmptySourceUrl,
}

/// 打开输入源时的错误
#[derive(Error, Debug)]
pub enum OpenError {
  #[error("无法打开本地摄像头: {0}")]
  DeviceOpen(String),
  #[error("无法解析视频流地址: {0}")]
  StreamResolution(#[from] ResolveError),
  #[error("无法打开视频流: {0}")]
  StreamOpen(String),
}

/// 读取帧时的错误
#[derive(Error, Debug)]
pub enum ReadError {
  #[error("读取帧失败: {0}")]
  Stream(String),
  #[error("等待帧超时")]
  Timeout,
  #[error("输入源已关闭")]
  Closed,
}

/// 已打开的帧输入源
pub trait FrameSource {
  /// 读取下一帧，`Ok(None)` 表示流已结束
  ///
  /// 流结束只报告一次，之后的读取返回 [`ReadError::Closed`]。
  fn read_frame(&mut self) -> Result<Option<Frame>, ReadError>;

  /// 释放底层设备或流，可重复调用
  fn close(&mut self);
}

/// 根据配置打开输入源
pub trait SourceOpener {
  type Source: FrameSource;

  fn open(&self, config: &SourceConfig) -> Result<Self::Source, OpenError>;
}
