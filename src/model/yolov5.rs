// 该文件是 Liuguang （流光） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 ONNX 模型
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

use std::borrow::Cow;

use image::{Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{COCO_LABELS, DetectItem, DetectResult, Model, coco_label, non_max_suppression},
};

const YOLOV5_INPUT_SIZE: u32 = 640;
const YOLOV5_STRIDE: u32 = 32;
const YOLOV5_CONF_THRESH: f32 = 0.25;
const YOLOV5_IOU_THRESH: f32 = 0.45;
const YOLOV5_MAX_DETECTIONS: usize = 300;
const YOLOV5_BOX_FIELDS: usize = 5; // cx, cy, w, h, objectness
const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

type Yolov5Plan = TypedSimplePlan<TypedModel>;

#[derive(Error, Debug)]
pub enum Yolov5Error {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出形状不符合预期: {0:?}")]
  UnexpectedOutput(Vec<usize>),
}

impl Yolov5Error {
  fn load(e: TractError) -> Self {
    Yolov5Error::ModelLoadError(format!("{:#}", e))
  }

  fn inference(e: TractError) -> Self {
    Yolov5Error::InferenceError(format!("{:#}", e))
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Yolov5Params {
  input_size: u32,
  confidence: f32,
  iou: f32,
  max_detections: usize,
}

impl Default for Yolov5Params {
  fn default() -> Self {
    Self {
      input_size: YOLOV5_INPUT_SIZE,
      confidence: YOLOV5_CONF_THRESH,
      iou: YOLOV5_IOU_THRESH,
      max_detections: YOLOV5_MAX_DETECTIONS,
    }
  }
}

pub struct Yolov5Builder {
  model_path: String,
  params: Yolov5Params,
}

impl FromUrlWithScheme for Yolov5Builder {
  const SCHEME: &'static str = "yolov5";
}

impl FromUrl for Yolov5Builder {
  type Error = Yolov5Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov5Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut params = Yolov5Params::default();
    if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == "size") {
      params.input_size = match value.parse::<u32>() {
        Ok(size) if size > 0 && size % YOLOV5_STRIDE == 0 => size,
        _ => {
          return Err(Yolov5Error::ModelPathError(format!(
            "输入尺寸必须是 {} 的正整数倍: {}",
            YOLOV5_STRIDE, value
          )));
        }
      };
    }

    Ok(Yolov5Builder {
      model_path: url.path().to_string(),
      params,
    })
  }
}

impl Yolov5Builder {
  pub fn confidence(mut self, confidence: f32) -> Self {
    self.params.confidence = confidence.clamp(0.0, 1.0);
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.params.iou = iou.clamp(0.0, 1.0);
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.params.max_detections = max_detections;
    self
  }

  pub fn build(self) -> Result<Yolov5, Yolov5Error> {
    info!("加载模型文件: {}", self.model_path);
    let size = self.params.input_size as usize;

    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(Yolov5Error::load)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
      )
      .map_err(Yolov5Error::load)?
      .into_optimized()
      .map_err(Yolov5Error::load)?
      .into_runnable()
      .map_err(Yolov5Error::load)?;

    info!("模型加载完成");
    debug!("模型参数: {:?}", self.params);

    Ok(Yolov5 {
      plan,
      params: self.params,
    })
  }
}

/// YOLOv5 检测模型，使用 tract 在 CPU 上推理
pub struct Yolov5 {
  plan: Yolov5Plan,
  params: Yolov5Params,
}

/// 信箱缩放参数，用于把模型坐标还原到原图
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
}

impl Letterbox {
  fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
    ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
  }
}

fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
  let (w, h) = (image.width().max(1) as f32, image.height().max(1) as f32);
  let scale = (size as f32 / w).min(size as f32 / h);
  let new_w = ((w * scale).round() as u32).clamp(1, size);
  let new_h = ((h * scale).round() as u32).clamp(1, size);
  let pad_x = (size - new_w) / 2;
  let pad_y = (size - new_h) / 2;

  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
  let mut canvas = RgbImage::from_pixel(size, size, Rgb(LETTERBOX_FILL));
  image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

  (
    canvas,
    Letterbox {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
    },
  )
}

/// 解码模型输出的每一行 `[cx, cy, w, h, obj, cls...]`
fn decode_predictions(
  data: &[f32],
  cols: usize,
  params: &Yolov5Params,
  letterbox: &Letterbox,
  width: u32,
  height: u32,
) -> Vec<DetectItem> {
  let mut candidates = Vec::new();

  for row in data.chunks_exact(cols) {
    let objectness = row[4];
    if objectness < params.confidence {
      continue;
    }

    let (class_id, class_score) = row[YOLOV5_BOX_FIELDS..]
      .iter()
      .copied()
      .enumerate()
      .fold((0usize, f32::MIN), |best, (i, s)| {
        if s > best.1 { (i, s) } else { best }
      });

    let score = objectness * class_score;
    if score < params.confidence {
      continue;
    }

    let (cx, cy, bw, bh) = (row[0], row[1], row[2], row[3]);
    let (x_min, y_min) = letterbox.to_frame(cx - bw / 2.0, cy - bh / 2.0);
    let (x_max, y_max) = letterbox.to_frame(cx + bw / 2.0, cy + bh / 2.0);

    let class_id = class_id as u32;
    candidates.push(DetectItem::clamped(
      class_id,
      coco_label(class_id),
      score,
      [x_min, y_min, x_max, y_max],
      width,
      height,
    ));
  }

  debug!("置信度过滤后候选框: {}", candidates.len());
  non_max_suppression(candidates, params.iou, params.max_detections)
}

impl Model for Yolov5 {
  type Input = Frame;
  type Output = DetectResult;
  type Error = Yolov5Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let size = self.params.input_size;
    let (canvas, letterbox) = letterbox(&input.image, size);

    let side = size as usize;
    let tensor: Tensor =
      tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
      })
      .into();

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(Yolov5Error::inference)?;

    let output = outputs
      .first()
      .ok_or_else(|| Yolov5Error::InferenceError("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(Yolov5Error::inference)?;

    let shape = view.shape().to_vec();
    let cols = YOLOV5_BOX_FIELDS + COCO_LABELS.len();
    if shape.len() != 3 || shape[2] != cols {
      return Err(Yolov5Error::UnexpectedOutput(shape));
    }

    let data: Cow<'_, [f32]> = match view.as_slice() {
      Some(slice) => Cow::Borrowed(slice),
      None => Cow::Owned(view.iter().copied().collect()),
    };

    let items = decode_predictions(
      &data,
      cols,
      &self.params,
      &letterbox,
      input.width(),
      input.height(),
    );
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::from(items))
  }

  fn label_of(&self, class_id: u32) -> &str {
    coco_label(class_id)
  }
}
