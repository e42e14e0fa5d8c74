// 该文件是 Liuguang （流光） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 本模块用 GStreamer 管道实现两类输入源：
//! - 本地摄像头（`autovideosrc`，或指定设备时使用 `v4l2src`）
//! - 远程视频流（先经 [`StreamResolver`] 得到媒体地址，再由 `uridecodebin` 解码）
//!
//! 所有管道都以 `videoconvert ! video/x-raw,format=RGB ! appsink` 结尾，
//! 帧以 RGB 格式交给调度器。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use liuguang::input::{FrameSource, GStreamerOpener, SourceConfig, SourceOpener, YtDlpResolver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let opener = GStreamerOpener::new(YtDlpResolver::default());
//! let mut source = opener.open(&SourceConfig::Local)?;
//! while let Some(frame) = source.read_frame()? {
//!     println!("帧 {}: {}x{}", frame.index, frame.width(), frame.height());
//! }
//! source.close();
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, error, info, warn};

use crate::{
  frame::Frame,
  input::{FrameSource, OpenError, ReadError, SourceConfig, SourceOpener, StreamResolver},
};

const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

enum GStreamerInputBuilderItem {
  AutoCamera,
  CameraSource { device: String },
  UriSource { uri: String },
  TargetFormat { format: String },
  AppSink { drop: bool },
  #[cfg(test)]
  TestSource { num_buffers: u32 },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::AutoCamera => "autovideosrc".to_string(),
      GStreamerInputBuilderItem::CameraSource { device } => {
        format!("v4l2src device={}", device)
      }
      GStreamerInputBuilderItem::UriSource { uri } => {
        format!("uridecodebin uri=\"{}\"", uri)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::AppSink { drop } => {
        format!(
          "appsink name=sink max-buffers=2 drop={} sync=false",
          drop
        )
      }
      #[cfg(test)]
      GStreamerInputBuilderItem::TestSource { num_buffers } => {
        format!(
          "videotestsrc num-buffers={} ! video/x-raw,width=62,height=48",
          num_buffers
        )
      }
    }
  }
}

/// 将管道描述拼接起来并启动
fn launch(
  items: &[GStreamerInputBuilderItem],
  open_timeout: Duration,
  read_timeout: Duration,
) -> Result<GStreamerInput, String> {
  gst::init().map_err(|e| format!("GStreamer 初始化失败: {}", e))?;

  let description = items
    .iter()
    .map(GStreamerInputBuilderItem::to_pipeline)
    .collect::<Vec<String>>()
    .join(" ! ");

  info!("GStreamer 输入管道: {}", description);

  let pipeline = gst::parse::launch(&description)
    .map_err(|e| format!("管道描述无效: {}", e))?
    .downcast::<gst::Pipeline>()
    .map_err(|_| "无法创建管道".to_string())?;

  let appsink = pipeline
    .by_name("sink")
    .ok_or_else(|| "找不到 appsink 元素".to_string())?
    .downcast::<gst_app::AppSink>()
    .map_err(|_| "无法转换为 appsink 元素".to_string())?;

  let mut input = GStreamerInput {
    pipeline,
    appsink,
    read_timeout,
    started_at: Instant::now(),
    frame_index: 0,
    finished: false,
    closed: false,
  };

  if let Err(e) = input.pipeline.set_state(gst::State::Playing) {
    let reason = input.bus_error().unwrap_or_else(|| e.to_string());
    input.close();
    return Err(reason);
  }

  // 等待管道进入可播放状态，直播源会返回 NoPreroll
  let timeout = gst::ClockTime::from_mseconds(open_timeout.as_millis() as u64);
  let (result, current, pending) = input.pipeline.state(timeout);
  debug!("管道状态: {:?} (待定: {:?})", current, pending);
  if let Some(reason) = input.bus_error() {
    input.close();
    return Err(reason);
  }
  if let Err(e) = result {
    input.close();
    return Err(format!("管道无法启动: {}", e));
  }

  input.started_at = Instant::now();
  Ok(input)
}

/// 基于 GStreamer 的输入源打开器
///
/// 本地模式打开默认摄像头，远程模式先解析媒体地址再打开。
pub struct GStreamerOpener<R> {
  camera: Option<String>,
  resolver: R,
  open_timeout: Duration,
  read_timeout: Duration,
}

impl<R: StreamResolver> GStreamerOpener<R> {
  pub fn new(resolver: R) -> Self {
    Self {
      camera: None,
      resolver,
      open_timeout: DEFAULT_OPEN_TIMEOUT,
      read_timeout: DEFAULT_READ_TIMEOUT,
    }
  }

  /// 指定本地摄像头设备（如 `/dev/video0`）
  pub fn camera(mut self, device: Option<String>) -> Self {
    self.camera = device;
    self
  }

  pub fn open_timeout(mut self, timeout: Duration) -> Self {
    self.open_timeout = timeout;
    self
  }

  pub fn read_timeout(mut self, timeout: Duration) -> Self {
    self.read_timeout = timeout;
    self
  }

  fn open_local(&self) -> Result<GStreamerInput, OpenError> {
    let source = match &self.camera {
      Some(device) => GStreamerInputBuilderItem::CameraSource {
        device: device.clone(),
      },
      None => GStreamerInputBuilderItem::AutoCamera,
    };
    let items = [
      source,
      GStreamerInputBuilderItem::TargetFormat {
        format: "RGB".to_string(),
      },
      GStreamerInputBuilderItem::AppSink { drop: true },
    ];

    launch(&items, self.open_timeout, self.read_timeout).map_err(|reason| {
      error!("无法打开摄像头: {}", reason);
      OpenError::DeviceOpen(reason)
    })
  }

  fn open_remote(
    &self,
    url: &str,
    quality: crate::quality::QualityPreference,
  ) -> Result<GStreamerInput, OpenError> {
    let media_url = self.resolver.resolve(url, quality.format_rule())?;

    let items = [
      GStreamerInputBuilderItem::UriSource {
        uri: media_url.to_string(),
      },
      GStreamerInputBuilderItem::TargetFormat {
        format: "RGB".to_string(),
      },
      GStreamerInputBuilderItem::AppSink { drop: false },
    ];

    launch(&items, self.open_timeout, self.read_timeout).map_err(|reason| {
      error!("无法打开视频流: {}", reason);
      OpenError::StreamOpen(reason)
    })
  }
}

impl<R: StreamResolver> SourceOpener for GStreamerOpener<R> {
  type Source = GStreamerInput;

  fn open(&self, config: &SourceConfig) -> Result<Self::Source, OpenError> {
    match config {
      SourceConfig::Local => self.open_local(),
      SourceConfig::Remote(remote) => self.open_remote(remote.url(), remote.quality()),
    }
  }
}

/// GStreamer 输入源，持有管道直至关闭
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  read_timeout: Duration,
  started_at: Instant,
  frame_index: u64,
  finished: bool,
  closed: bool,
}

impl GStreamerInput {
  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => {
        debug!("GStreamer 错误详情: {:?}", err.debug());
        Some(err.error().to_string())
      }
      _ => None,
    }
  }

  fn convert_sample(&self, sample: gst::Sample) -> Result<Frame, ReadError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| ReadError::Stream("样本中没有缓冲区".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| ReadError::Stream("样本中没有 caps".to_string()))?;

    let video_info = gst_video::VideoInfo::from_caps(caps)
      .map_err(|_| ReadError::Stream("无法从 caps 获取视频信息".to_string()))?;

    if video_info.format() != gst_video::VideoFormat::Rgb {
      return Err(ReadError::Stream(format!(
        "不支持的视频格式: {:?}",
        video_info.format()
      )));
    }

    let map = buffer
      .map_readable()
      .map_err(|e| ReadError::Stream(format!("无法映射缓冲区: {}", e)))?;

    let stride = video_info.stride()[0].max(0) as usize;
    let timestamp_ms = self.started_at.elapsed().as_millis() as u64;

    Frame::from_strided_rgb(
      map.as_slice(),
      video_info.width(),
      video_info.height(),
      stride,
      self.frame_index,
      timestamp_ms,
    )
    .ok_or_else(|| {
      ReadError::Stream(format!(
        "缓冲区大小不匹配: {}x{} (跨距 {}), 实际 {} 字节",
        video_info.width(),
        video_info.height(),
        stride,
        map.as_slice().len()
      ))
    })
  }
}

impl FrameSource for GStreamerInput {
  fn read_frame(&mut self) -> Result<Option<Frame>, ReadError> {
    if self.closed || self.finished {
      return Err(ReadError::Closed);
    }

    let timeout = gst::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
    match self.appsink.try_pull_sample(timeout) {
      Some(sample) => {
        let frame = self.convert_sample(sample)?;
        self.frame_index += 1;
        Ok(Some(frame))
      }
      None => {
        if let Some(reason) = self.bus_error() {
          return Err(ReadError::Stream(reason));
        }
        if self.appsink.is_eos() {
          info!("视频流结束，共读取 {} 帧", self.frame_index);
          self.finished = true;
          return Ok(None);
        }
        Err(ReadError::Timeout)
      }
    }
  }

  fn close(&mut self) {
    if self.closed {
      return;
    }
    self.closed = true;
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
    info!("输入源已关闭");
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    self.close();
  }
}
