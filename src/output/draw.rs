// 该文件是 Liuguang （流光） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;

use crate::{
  frame::Frame,
  model::{DetectItem, DetectResult},
};

// 叠加层常量
const OVERLAY_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [0, 0, 0];
const LINE_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum AnnotatorError {
  #[error("无法加载字体: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 标签文本，形如 `person 0.87`
pub fn format_label(item: &DetectItem) -> String {
  format!("{} {:.2}", item.label, item.score)
}

/// 在帧上绘制检测框和标签
pub struct Annotator {
  font: FontArc,
  scale: PxScale,
}

impl Annotator {
  /// 使用内置字体
  pub fn new() -> Result<Self, AnnotatorError> {
    Ok(Self::with_font(FontArc::try_from_slice(DEFAULT_FONT)?))
  }

  pub fn with_font(font: FontArc) -> Self {
    Self {
      font,
      scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  /// 绘制所有检测结果，检测结果为空时原样返回
  pub fn annotate(&self, mut frame: Frame, result: &DetectResult) -> Frame {
    for item in result.iter() {
      self.draw_item(&mut frame.image, item);
    }
    frame
  }

  fn draw_item(&self, image: &mut RgbImage, item: &DetectItem) {
    let color = Rgb(OVERLAY_COLOR);
    let x_min = item.bbox[0].floor() as i32;
    let y_min = item.bbox[1].floor() as i32;
    let x_max = item.bbox[2].ceil() as i32;
    let y_max = item.bbox[3].ceil() as i32;

    // 向内加粗边框
    for t in 0..LINE_THICKNESS {
      let w = x_max - x_min + 1 - 2 * t;
      let h = y_max - y_min + 1 - 2 * t;
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format_label(item);
    let (text_w, text_h) = text_size(self.scale, &self.font, &label);
    let label_w = text_w as i32 + 2 * LABEL_PADDING;
    let label_h = text_h as i32 + 2 * LABEL_PADDING;

    // 标签放在边框上方，超出图像顶部时贴住顶边
    let label_x = x_min;
    let label_y = (y_min - label_h).max(0);

    draw_filled_rect_mut(
      image,
      Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32),
      color,
    );
    draw_text_mut(
      image,
      Rgb(TEXT_COLOR),
      label_x + LABEL_PADDING,
      label_y + LABEL_PADDING,
      self.scale,
      &self.font,
      &label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient_frame(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    Frame::new(image, 0, 0)
  }

  fn person(score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem::clamped(0, "person", score, bbox, 320, 240)
  }

  #[test]
  fn label_uses_two_decimals() {
    assert_eq!(format_label(&person(0.873, [0.0; 4])), "person 0.87");
    assert_eq!(format_label(&person(1.0, [0.0; 4])), "person 1.00");
    assert_eq!(format_label(&person(0.006, [0.0; 4])), "person 0.01");
  }

  #[test]
  fn empty_result_is_pixel_identity() {
    let annotator = Annotator::new().unwrap();
    let frame = gradient_frame(320, 240);
    let expected = frame.image.clone();

    let annotated = annotator.annotate(frame, &DetectResult::default());
    assert_eq!(annotated.image, expected);
  }

  #[test]
  fn box_edges_are_drawn_in_overlay_color() {
    let annotator = Annotator::new().unwrap();
    let frame = gradient_frame(320, 240);
    let result = DetectResult::from(vec![person(0.9, [50.0, 100.0, 150.0, 200.0])]);
    let before = result.clone();

    let annotated = annotator.annotate(frame, &result);

    let green = Rgb(OVERLAY_COLOR);
    assert_eq!(annotated.image.get_pixel(50, 150), &green);
    assert_eq!(annotated.image.get_pixel(51, 150), &green);
    assert_eq!(annotated.image.get_pixel(150, 150), &green);
    assert_eq!(annotated.image.get_pixel(100, 200), &green);
    // 框内像素不变
    assert_eq!(annotated.image.get_pixel(100, 150), &Rgb([100, 150, 250]));
    // 标签背景在框上方
    assert_eq!(annotated.image.get_pixel(50, 99), &green);
    assert_eq!(result, before);
  }

  #[test]
  fn label_stays_inside_image_near_top() {
    let annotator = Annotator::new().unwrap();
    let frame = gradient_frame(320, 240);
    let result = DetectResult::from(vec![person(0.5, [0.0, 0.0, 319.0, 239.0])]);

    let annotated = annotator.annotate(frame, &result);
    assert_eq!(annotated.image.dimensions(), (320, 240));
    assert_eq!(annotated.image.get_pixel(0, 0), &Rgb(OVERLAY_COLOR));
  }

  #[test]
  fn degenerate_boxes_do_not_panic() {
    let annotator = Annotator::new().unwrap();
    let frame = gradient_frame(4, 4);
    let result = DetectResult::from(vec![
      DetectItem::clamped(0, "person", 0.4, [2.0, 2.0, 2.0, 2.0], 4, 4),
      DetectItem::clamped(0, "person", 0.4, [3.0, 0.0, 3.0, 3.0], 4, 4),
    ]);
    let annotated = annotator.annotate(frame, &result);
    assert_eq!(annotated.image.dimensions(), (4, 4));
  }
}
