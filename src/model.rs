// 该文件是 Liuguang （流光） 项目的一部分。
// src/model.rs - 检测模型
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

mod coco;
pub use self::coco::{COCO_LABELS, coco_label};

#[cfg(feature = "model_yolov5")]
mod yolov5;
#[cfg(feature = "model_yolov5")]
pub use self::yolov5::{Yolov5, Yolov5Builder, Yolov5Error};

/// 检测模型
///
/// 一个实例在所有会话间复用，只保证顺序调用安全。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;

  /// 类别编号对应的标签，超出标签表时返回 `"unknown"`
  fn label_of(&self, class_id: u32) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

impl DetectItem {
  /// 构造检测项，分数裁剪到 [0, 1]，边框裁剪到图像范围内
  pub fn clamped(
    class_id: u32,
    label: impl Into<String>,
    score: f32,
    bbox: [f32; 4],
    width: u32,
    height: u32,
  ) -> Self {
    let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
    Self {
      class_id,
      label: label.into(),
      score,
      bbox: clamp_bbox(bbox, width, height),
    }
  }

  pub fn area(&self) -> f32 {
    (self.bbox[2] - self.bbox[0]) * (self.bbox[3] - self.bbox[1])
  }

  pub fn iou(&self, other: &DetectItem) -> f32 {
    let x_min = self.bbox[0].max(other.bbox[0]);
    let y_min = self.bbox[1].max(other.bbox[1]);
    let x_max = self.bbox[2].min(other.bbox[2]);
    let y_max = self.bbox[3].min(other.bbox[3]);

    let intersection = if x_max > x_min && y_max > y_min {
      (x_max - x_min) * (y_max - y_min)
    } else {
      0.0
    };
    let union = self.area() + other.area() - intersection;

    if union > 0.0 { intersection / union } else { 0.0 }
  }
}

/// 将边框裁剪到 [0, width) x [0, height)，并保证 x_min <= x_max、y_min <= y_max
pub fn clamp_bbox(bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
  let x_limit = (width.max(1) - 1) as f32;
  let y_limit = (height.max(1) - 1) as f32;
  let fix = |v: f32, limit: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, limit) };

  let (x1, x2) = (fix(bbox[0], x_limit), fix(bbox[2], x_limit));
  let (y1, y2) = (fix(bbox[1], y_limit), fix(bbox[3], y_limit));

  [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
}

/// 单帧的检测结果，顺序为模型输出顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 按类别的非极大值抑制，结果按分数从高到低排列
pub fn non_max_suppression(
  mut items: Vec<DetectItem>,
  iou_threshold: f32,
  max_detections: usize,
) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for item in items {
    if kept.len() >= max_detections {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && k.iou(&item) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}
