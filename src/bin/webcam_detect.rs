// 该文件是 Liuguang （流光） 项目的一部分。
// src/bin/webcam_detect.rs - 摄像头实时检测
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

use std::{sync::mpsc, time::Duration};

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use url::Url;

use liuguang::{
  FromUrl,
  input::{GStreamerOpener, SourceConfig, YtDlpResolver},
  model::Yolov5Builder,
  notice::LogNotifier,
  output::{Annotator, GStreamerDisplay},
  task::{PipelineState, Scheduler, main_loop},
};

/// 摄像头实时检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolov5:///path/to/yolov5s.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 摄像头设备，例如 /dev/video0；不指定时使用系统默认摄像头
  #[arg(long, value_name = "DEVICE")]
  pub camera: Option<String>,
  /// 两帧之间的调度间隔（毫秒）
  #[arg(long, value_name = "MS", default_value_t = 10)]
  pub interval_ms: u64,
  /// 置信度阈值
  #[arg(long, value_name = "THRESHOLD", default_value_t = 0.25)]
  pub confidence: f32,
  /// NMS IoU 阈值
  #[arg(long, value_name = "THRESHOLD", default_value_t = 0.45)]
  pub iou: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("摄像头: {}", args.camera.as_deref().unwrap_or("默认"));

  info!("正在加载模型...");
  let model = Yolov5Builder::from_url(&args.model)?
    .confidence(args.confidence)
    .iou(args.iou)
    .build()?;
  info!("模型加载完成");

  let opener = GStreamerOpener::new(YtDlpResolver::default()).camera(args.camera);
  let display = GStreamerDisplay::new()?;
  let scheduler = Scheduler::new(opener, model, Annotator::new()?, display, LogNotifier)
    .with_interval(Duration::from_millis(args.interval_ms));

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;

  let state = main_loop::run(scheduler, &SourceConfig::Local, Some(rx))?;
  if state == PipelineState::Errored {
    bail!("检测会话异常结束");
  }

  info!("检测结束");
  Ok(())
}
