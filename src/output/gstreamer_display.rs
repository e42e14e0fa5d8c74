// 该文件是 Liuguang （流光） 项目的一部分。
// src/output/gstreamer_display.rs - GStreamer 窗口显示输出
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

//! # GStreamer 窗口显示模块
//!
//! 把标注后的 RGB 帧推入 `appsrc ! videoconvert ! autovideosink` 管道，
//! 由平台默认的视频窗口显示。帧尺寸变化时重新设置 caps。
//!
//! ```no_run
//! use liuguang::output::GStreamerDisplay;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let display = GStreamerDisplay::new()?;
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{frame::Frame, output::Publish};

// 窗口跟不上时丢弃最旧的帧，避免 appsrc 队列无限增长
const DISPLAY_PIPELINE: &str = "appsrc name=src is-live=true format=time do-timestamp=true \
   max-buffers=2 leaky-type=downstream ! videoconvert ! autovideosink sync=false";

/// GStreamer 显示输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerDisplayError {
  /// GStreamer 库错误
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// 无法获取 appsrc 元素
  #[error("找不到 appsrc 元素")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("无法转换为 appsrc 元素")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("管道错误: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// 桌面窗口显示
pub struct GStreamerDisplay {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  size: Cell<Option<(u32, u32)>>,
  frame_count: Cell<u64>,
}

impl GStreamerDisplay {
  pub fn new() -> Result<Self, GStreamerDisplayError> {
    gst::init()?;

    info!("创建显示管道: {}", DISPLAY_PIPELINE);

    let pipeline = gst::parse::launch(DISPLAY_PIPELINE)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerDisplayError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayError::AppSrcConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerDisplay {
      pipeline,
      appsrc,
      size: Cell::new(None),
      frame_count: Cell::new(0),
    })
  }

  fn ensure_caps(&self, width: u32, height: u32) {
    if self.size.get() == Some((width, height)) {
      return;
    }

    debug!("显示尺寸变化: {}x{}", width, height);
    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(0, 1))
      .build();
    self.appsrc.set_caps(Some(&caps));
    self.size.set(Some((width, height)));
  }
}

impl Publish for GStreamerDisplay {
  type Error = GStreamerDisplayError;

  fn publish(&self, frame: &Frame) -> Result<(), Self::Error> {
    // 窗口被关闭时 sink 会在总线上报错，而 push_buffer 仍然成功
    if let Some(bus) = self.pipeline.bus() {
      check_bus(&bus)?;
    }

    self.ensure_caps(frame.width(), frame.height());

    let buffer = gst::Buffer::from_slice(aligned_rows(frame));
    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerDisplayError::PipelineError(format!("无法推送缓冲区: {:?}", e)))?;

    self.frame_count.set(self.frame_count.get() + 1);
    Ok(())
  }
}

/// 取出总线上的错误或结束消息
fn check_bus(bus: &gst::Bus) -> Result<(), GStreamerDisplayError> {
  let Some(message) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) else {
    return Ok(());
  };
  match message.view() {
    gst::MessageView::Error(err) => {
      debug!("显示管道错误详情: {:?}", err.debug());
      Err(GStreamerDisplayError::PipelineError(format!(
        "显示窗口已关闭: {}",
        err.error()
      )))
    }
    gst::MessageView::Eos(_) => Err(GStreamerDisplayError::PipelineError(
      "显示管道已结束".to_string(),
    )),
    _ => Ok(()),
  }
}

/// GStreamer 的 RGB 行跨距按 4 字节对齐
fn aligned_rows(frame: &Frame) -> Vec<u8> {
  let row_bytes = frame.width() as usize * frame.channels();
  let stride = (row_bytes + 3) & !3;
  if stride == row_bytes {
    return frame.as_nhwc().to_vec();
  }

  let mut data = vec![0u8; stride * frame.height() as usize];
  for (dst, src) in data
    .chunks_exact_mut(stride)
    .zip(frame.as_nhwc().chunks_exact(row_bytes))
  {
    dst[..row_bytes].copy_from_slice(src);
  }
  data
}

impl Drop for GStreamerDisplay {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止显示管道: {}", e);
    }

    info!("显示已关闭，共显示 {} 帧", self.frame_count.get());
  }
}
