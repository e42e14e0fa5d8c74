// 该文件是 Liuguang （流光） 项目的一部分。
// tests/scheduler.rs - 调度器会话生命周期测试
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
  cell::{Cell, RefCell},
  collections::VecDeque,
  rc::Rc,
  time::Duration,
};

use image::{Rgb, RgbImage};
use liuguang::{
  frame::Frame,
  input::{FrameSource, OpenError, ReadError, SourceConfig, SourceOpener},
  model::{DetectItem, DetectResult, Model, coco_label},
  notice::{Notice, NoticeLevel, Notify},
  output::{Annotator, Publish},
  quality::QualityPreference,
  task::{PipelineState, Scheduler, StartError, Tick},
};

#[derive(Clone, Copy)]
enum Step {
  Frame,
  End,
  Fail,
}

#[derive(Default)]
struct Counters {
  opens: Cell<u32>,
  reads: Cell<u32>,
  closes: Cell<u32>,
}

struct ScriptedSource {
  steps: VecDeque<Step>,
  index: u64,
  counters: Rc<Counters>,
}

impl FrameSource for ScriptedSource {
  fn read_frame(&mut self) -> Result<Option<Frame>, ReadError> {
    self.counters.reads.set(self.counters.reads.get() + 1);
    match self.steps.pop_front() {
      Some(Step::Frame) => {
        let image = RgbImage::from_pixel(64, 48, Rgb([10, 20, 30]));
        let frame = Frame::new(image, self.index, self.index * 33);
        self.index += 1;
        Ok(Some(frame))
      }
      Some(Step::End) => Ok(None),
      Some(Step::Fail) => Err(ReadError::Stream("连接中断".to_string())),
      None => Err(ReadError::Closed),
    }
  }

  fn close(&mut self) {
    self.counters.closes.set(self.counters.closes.get() + 1);
  }
}

struct ScriptedOpener {
  steps: Vec<Step>,
  fail_open: bool,
  counters: Rc<Counters>,
}

impl SourceOpener for ScriptedOpener {
  type Source = ScriptedSource;

  fn open(&self, config: &SourceConfig) -> Result<Self::Source, OpenError> {
    self.counters.opens.set(self.counters.opens.get() + 1);
    if self.fail_open {
      return Err(match config {
        SourceConfig::Local => OpenError::DeviceOpen("设备忙".to_string()),
        SourceConfig::Remote(_) => OpenError::StreamOpen("404".to_string()),
      });
    }
    Ok(ScriptedSource {
      steps: self.steps.iter().copied().collect(),
      index: 0,
      counters: self.counters.clone(),
    })
  }
}

/// 每帧固定返回若干检测结果
struct FixedModel {
  detections: usize,
  fail: bool,
  calls: Rc<Cell<u32>>,
}

impl Model for FixedModel {
  type Input = Frame;
  type Output = DetectResult;
  type Error = String;

  fn infer(&self, input: &Frame) -> Result<DetectResult, String> {
    self.calls.set(self.calls.get() + 1);
    if self.fail {
      return Err("张量形状错误".to_string());
    }
    let items = (0..self.detections)
      .map(|i| {
        DetectItem::clamped(
          0,
          coco_label(0),
          0.873,
          [4.0 + i as f32 * 20.0, 20.0, 18.0 + i as f32 * 20.0, 40.0],
          input.width(),
          input.height(),
        )
      })
      .collect::<Vec<_>>();
    Ok(DetectResult::from(items))
  }

  fn label_of(&self, class_id: u32) -> &str {
    coco_label(class_id)
  }
}

#[derive(Default, Clone)]
struct RecordingPublisher {
  frames: Rc<RefCell<Vec<Frame>>>,
  fail: bool,
}

impl Publish for RecordingPublisher {
  type Error = String;

  fn publish(&self, frame: &Frame) -> Result<(), String> {
    if self.fail {
      return Err("窗口已关闭".to_string());
    }
    self.frames.borrow_mut().push(frame.clone());
    Ok(())
  }
}

#[derive(Default, Clone)]
struct RecordingNotifier(Rc<RefCell<Vec<Notice>>>);

impl Notify for RecordingNotifier {
  fn notify(&self, notice: Notice) {
    self.0.borrow_mut().push(notice);
  }
}

struct Harness {
  counters: Rc<Counters>,
  infer_calls: Rc<Cell<u32>>,
  published: RecordingPublisher,
  notices: RecordingNotifier,
  scheduler: Scheduler<ScriptedOpener, FixedModel, RecordingPublisher, RecordingNotifier>,
}

struct Options {
  steps: Vec<Step>,
  fail_open: bool,
  detections: usize,
  fail_infer: bool,
  fail_publish: bool,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      steps: Vec::new(),
      fail_open: false,
      detections: 1,
      fail_infer: false,
      fail_publish: false,
    }
  }
}

fn harness(options: Options) -> Harness {
  let counters = Rc::new(Counters::default());
  let infer_calls = Rc::new(Cell::new(0));
  let published = RecordingPublisher {
    fail: options.fail_publish,
    ..Default::default()
  };
  let notices = RecordingNotifier::default();

  let scheduler = Scheduler::new(
    ScriptedOpener {
      steps: options.steps,
      fail_open: options.fail_open,
      counters: counters.clone(),
    },
    FixedModel {
      detections: options.detections,
      fail: options.fail_infer,
      calls: infer_calls.clone(),
    },
    Annotator::new().unwrap(),
    published.clone(),
    notices.clone(),
  )
  .with_interval(Duration::from_millis(10));

  Harness {
    counters,
    infer_calls,
    published,
    notices,
    scheduler,
  }
}

/// 模拟宿主事件循环：不断调度直到调度器要求停止，返回调度次数
fn drive(scheduler: &mut Scheduler<ScriptedOpener, FixedModel, RecordingPublisher, RecordingNotifier>) -> u32 {
  let mut scheduled = 0;
  while let Tick::Again(delay) = scheduler.tick() {
    assert_eq!(delay, Duration::from_millis(10));
    scheduled += 1;
    assert!(scheduled < 1000, "调度器没有停止");
  }
  scheduled
}

fn levels(notices: &RecordingNotifier) -> Vec<NoticeLevel> {
  notices.0.borrow().iter().map(|n| n.level).collect()
}

#[test]
fn three_frames_then_end_of_stream() {
  let mut h = harness(Options {
    steps: vec![Step::Frame, Step::Frame, Step::Frame, Step::End],
    ..Default::default()
  });

  assert_eq!(h.scheduler.state(), PipelineState::Idle);
  let first = h.scheduler.start(&SourceConfig::Local).unwrap();
  assert_eq!(first, Duration::from_millis(10));
  assert_eq!(h.scheduler.state(), PipelineState::Running);

  let rescheduled = drive(&mut h.scheduler);

  assert_eq!(rescheduled, 3);
  assert_eq!(h.scheduler.ticks(), 3);
  assert_eq!(h.published.frames.borrow().len(), 3);
  assert_eq!(h.infer_calls.get(), 3);
  assert_eq!(h.scheduler.state(), PipelineState::Stopped);
  assert_eq!(h.counters.closes.get(), 1);
  assert_eq!(levels(&h.notices), vec![NoticeLevel::Info]);

  // 之后的调度不再读帧
  assert_eq!(h.scheduler.tick(), Tick::Halt);
  assert_eq!(h.counters.reads.get(), 4);
  assert_eq!(h.counters.closes.get(), 1);
}

#[test]
fn open_failure_stays_idle() {
  let mut h = harness(Options {
    steps: vec![Step::Frame],
    fail_open: true,
    ..Default::default()
  });

  let err = h.scheduler.start(&SourceConfig::Local).unwrap_err();
  assert!(matches!(err, StartError::Open(OpenError::DeviceOpen(_))));
  assert_eq!(h.scheduler.state(), PipelineState::Idle);
  assert_eq!(h.scheduler.tick(), Tick::Halt);

  assert_eq!(h.counters.opens.get(), 1);
  assert_eq!(h.counters.reads.get(), 0);
  assert_eq!(h.counters.closes.get(), 0);
  assert_eq!(levels(&h.notices), vec![NoticeLevel::Error]);
}

#[test]
fn remote_open_failure_reports_stream_error() {
  let mut h = harness(Options {
    fail_open: true,
    ..Default::default()
  });

  let config = SourceConfig::remote("https://example.com/live", QualityPreference::Low).unwrap();
  let err = h.scheduler.start(&config).unwrap_err();
  assert!(matches!(err, StartError::Open(OpenError::StreamOpen(_))));
  assert_eq!(h.scheduler.state(), PipelineState::Idle);
}

#[test]
fn two_frames_then_read_error() {
  let mut h = harness(Options {
    steps: vec![Step::Frame, Step::Frame, Step::Fail, Step::Frame],
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  let rescheduled = drive(&mut h.scheduler);

  assert_eq!(rescheduled, 2);
  assert_eq!(h.published.frames.borrow().len(), 2);
  assert_eq!(h.scheduler.state(), PipelineState::Errored);
  assert_eq!(h.counters.closes.get(), 1);
  assert_eq!(levels(&h.notices), vec![NoticeLevel::Error]);
  assert!(h.notices.0.borrow()[0].message.contains("连接中断"));
}

#[test]
fn stop_twice_is_same_as_once() {
  let mut h = harness(Options {
    steps: vec![Step::Frame; 10],
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  assert!(matches!(h.scheduler.tick(), Tick::Again(_)));

  h.scheduler.stop();
  h.scheduler.stop();

  assert_eq!(h.scheduler.state(), PipelineState::Stopped);
  assert_eq!(h.counters.closes.get(), 1);
  assert!(h.notices.0.borrow().is_empty());
}

#[test]
fn queued_tick_after_stop_is_noop() {
  let mut h = harness(Options {
    steps: vec![Step::Frame; 10],
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  assert!(matches!(h.scheduler.tick(), Tick::Again(_)));
  let reads = h.counters.reads.get();

  h.scheduler.stop();
  assert_eq!(h.scheduler.tick(), Tick::Halt);
  assert_eq!(h.counters.reads.get(), reads);
  assert_eq!(h.published.frames.borrow().len(), 1);
}

#[test]
fn second_start_while_running_is_rejected() {
  let mut h = harness(Options {
    steps: vec![Step::Frame; 3],
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  let err = h.scheduler.start(&SourceConfig::Local).unwrap_err();

  assert!(matches!(err, StartError::AlreadyRunning));
  assert_eq!(h.counters.opens.get(), 1);
  assert_eq!(h.scheduler.state(), PipelineState::Running);
}

#[test]
fn new_session_reuses_the_model() {
  let mut h = harness(Options {
    steps: vec![Step::Frame, Step::End],
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  drive(&mut h.scheduler);
  assert_eq!(h.scheduler.state(), PipelineState::Stopped);

  h.scheduler.start(&SourceConfig::Local).unwrap();
  assert_eq!(h.scheduler.state(), PipelineState::Running);
  assert_eq!(h.scheduler.ticks(), 0);
  drive(&mut h.scheduler);

  assert_eq!(h.counters.opens.get(), 2);
  assert_eq!(h.counters.closes.get(), 2);
  assert_eq!(h.infer_calls.get(), 2);
  assert_eq!(h.scheduler.model().label_of(0), "person");
}

#[test]
fn inference_failure_ends_session_with_error() {
  let mut h = harness(Options {
    steps: vec![Step::Frame; 3],
    fail_infer: true,
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  assert_eq!(drive(&mut h.scheduler), 0);

  assert_eq!(h.scheduler.state(), PipelineState::Errored);
  assert_eq!(h.counters.closes.get(), 1);
  assert!(h.published.frames.borrow().is_empty());
  assert_eq!(levels(&h.notices), vec![NoticeLevel::Error]);
}

#[test]
fn publish_failure_ends_session_with_error() {
  let mut h = harness(Options {
    steps: vec![Step::Frame; 3],
    fail_publish: true,
    ..Default::default()
  });

  h.scheduler.start(&SourceConfig::Local).unwrap();
  assert_eq!(drive(&mut h.scheduler), 0);

  assert_eq!(h.scheduler.state(), PipelineState::Errored);
  assert_eq!(h.counters.closes.get(), 1);
}

#[test]
fn published_frames_carry_overlays_only_when_detected() {
  let mut with = harness(Options {
    steps: vec![Step::Frame, Step::End],
    detections: 2,
    ..Default::default()
  });
  with.scheduler.start(&SourceConfig::Local).unwrap();
  drive(&mut with.scheduler);

  let mut without = harness(Options {
    steps: vec![Step::Frame, Step::End],
    detections: 0,
    ..Default::default()
  });
  without.scheduler.start(&SourceConfig::Local).unwrap();
  drive(&mut without.scheduler);

  let plain = RgbImage::from_pixel(64, 48, Rgb([10, 20, 30]));
  assert_eq!(without.published.frames.borrow()[0].image, plain);
  assert_ne!(with.published.frames.borrow()[0].image, plain);
  assert_eq!(with.published.frames.borrow()[0].index, 0);
}
