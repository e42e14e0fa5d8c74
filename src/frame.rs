// 该文件是 Liuguang （流光） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 帧数据
///
/// 像素按 R、G、B 顺序紧密排列（NHWC）。每个调度周期生成一帧，
/// 发布之后即被丢弃。
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引（从 0 开始）
  pub index: u64,
  /// 相对于输入源打开时刻的时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  /// 从带行跨距的 RGB 缓冲区构造帧
  ///
  /// `stride` 为每行字节数，可能大于 `width * 3`。
  /// 缓冲区长度不足时返回 `None`。
  pub fn from_strided_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    index: u64,
    timestamp_ms: u64,
  ) -> Option<Self> {
    let row_bytes = width as usize * RGB_CHANNELS;
    if stride < row_bytes {
      return None;
    }

    let needed = stride * (height as usize).saturating_sub(1) + row_bytes;
    if height == 0 || data.len() < needed {
      return None;
    }

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
      packed.extend_from_slice(&row[..row_bytes]);
    }

    RgbImage::from_raw(width, height, packed).map(|image| Self::new(image, index, timestamp_ms))
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}
