// 该文件是 Liuguang （流光） 项目的一部分。
// src/task.rs - 检测管线调度
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

//! 管线调度器
//!
//! 每个调度周期（tick）依次完成 读帧 → 推理 → 标注 → 发布，
//! 然后告诉宿主事件循环多久之后再调度下一次。调度器本身不持有线程，
//! 也不阻塞循环；停止只是改变状态，已排队的 tick 在开头检查状态后直接返回。

use std::{fmt::Display, time::Duration};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  input::{FrameSource, OpenError, SourceConfig, SourceOpener},
  model::{DetectResult, Model},
  notice::{Notice, Notify},
  output::{Annotator, Publish},
};

#[cfg(feature = "gstreamer_output")]
pub mod main_loop;

/// 两次调度之间的最小间隔
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  Running,
  Stopped,
  Errored,
}

/// 一次调度的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  /// 在给定延迟后再次调度
  Again(Duration),
  /// 不再调度
  Halt,
}

#[derive(Error, Debug)]
pub enum StartError {
  #[error("会话正在运行，不能重复启动")]
  AlreadyRunning,
  #[error(transparent)]
  Open(#[from] OpenError),
}

/// 检测管线调度器
///
/// 模型在构造时注入，并在所有会话之间复用。
pub struct Scheduler<O: SourceOpener, M, P, N> {
  opener: O,
  model: M,
  annotator: Annotator,
  publisher: P,
  notifier: N,
  interval: Duration,
  state: PipelineState,
  source: Option<O::Source>,
  ticks: u64,
}

impl<O, M, P, N> Scheduler<O, M, P, N>
where
  O: SourceOpener,
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: Display,
  P: Publish,
  P::Error: Display,
  N: Notify,
{
  pub fn new(opener: O, model: M, annotator: Annotator, publisher: P, notifier: N) -> Self {
    Self {
      opener,
      model,
      annotator,
      publisher,
      notifier,
      interval: DEFAULT_TICK_INTERVAL,
      state: PipelineState::Idle,
      source: None,
      ticks: 0,
    }
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  /// 当前会话已完成的 tick 数
  pub fn ticks(&self) -> u64 {
    self.ticks
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 打开输入源并开始新会话，返回首次调度前的延迟
  ///
  /// 打开失败时发出错误提示，状态保持不变，不安排任何调度。
  pub fn start(&mut self, config: &SourceConfig) -> Result<Duration, StartError> {
    if self.state == PipelineState::Running {
      warn!("会话正在运行，忽略启动请求");
      return Err(StartError::AlreadyRunning);
    }

    info!("启动会话: {:?}", config);
    let source = match self.opener.open(config) {
      Ok(source) => source,
      Err(e) => {
        self.notifier.notify(Notice::error(e.to_string()));
        return Err(StartError::Open(e));
      }
    };

    self.source = Some(source);
    self.ticks = 0;
    self.state = PipelineState::Running;
    info!("会话已启动");
    Ok(self.interval)
  }

  /// 执行一次调度
  pub fn tick(&mut self) -> Tick {
    if self.state != PipelineState::Running {
      debug!("会话已结束 ({:?})，忽略过期的调度", self.state);
      return Tick::Halt;
    }
    let Some(source) = self.source.as_mut() else {
      return Tick::Halt;
    };

    let now = std::time::Instant::now();
    let frame = match source.read_frame() {
      Ok(Some(frame)) => frame,
      Ok(None) => {
        self.finish(PipelineState::Stopped);
        self.notifier.notify(Notice::info("视频流已结束"));
        return Tick::Halt;
      }
      Err(e) => {
        self.fail(e);
        return Tick::Halt;
      }
    };

    let result = match self.model.infer(&frame) {
      Ok(result) => result,
      Err(e) => {
        self.fail(format!("推理失败: {}", e));
        return Tick::Halt;
      }
    };
    let elapsed_infer = now.elapsed();

    let index = frame.index;
    let detections = result.len();
    let annotated = self.annotator.annotate(frame, &result);
    if let Err(e) = self.publisher.publish(&annotated) {
      self.fail(format!("显示失败: {}", e));
      return Tick::Halt;
    }

    self.ticks += 1;
    debug!(
      "第 {} 帧: 检测到 {} 个物体，推理 {:.2?} / 总计 {:.2?}",
      index,
      detections,
      elapsed_infer,
      now.elapsed()
    );

    Tick::Again(self.interval)
  }

  /// 主动停止会话，可重复调用
  pub fn stop(&mut self) {
    if self.state != PipelineState::Running {
      debug!("会话未运行 ({:?})，忽略停止请求", self.state);
      return;
    }
    info!("停止会话");
    self.finish(PipelineState::Stopped);
  }

  fn fail(&mut self, reason: impl Display) {
    self.finish(PipelineState::Errored);
    self.notifier.notify(Notice::error(reason.to_string()));
  }

  fn finish(&mut self, state: PipelineState) {
    if let Some(mut source) = self.source.take() {
      source.close();
    }
    self.state = state;
    info!("会话结束: {:?}，共处理 {} 帧", state, self.ticks);
  }
}
