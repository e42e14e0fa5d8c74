// 该文件是 Liuguang （流光） 项目的一部分。
// src/task/main_loop.rs - 基于 GLib 主循环的调度
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
  cell::RefCell,
  fmt::Display,
  rc::Rc,
  sync::mpsc::{Receiver, TryRecvError},
  time::Duration,
};

use gstreamer::glib;
use tracing::{info, warn};

use crate::{
  frame::Frame,
  input::{SourceConfig, SourceOpener},
  model::{DetectResult, Model},
  notice::Notify,
  output::Publish,
  task::{PipelineState, Scheduler, StartError, Tick},
};

type Shared<O, M, P, N> = Rc<RefCell<Scheduler<O, M, P, N>>>;

/// 在当前线程的 GLib 主循环上运行一个会话，直到会话结束
///
/// 每个 tick 用一次性定时器挂在主循环上，执行完后根据结果重新挂载或退出循环。
/// `interrupt` 收到消息（或发送端关闭）时在下一个 tick 边界停止会话。
pub fn run<O, M, P, N>(
  scheduler: Scheduler<O, M, P, N>,
  config: &SourceConfig,
  interrupt: Option<Receiver<()>>,
) -> Result<PipelineState, StartError>
where
  O: SourceOpener + 'static,
  M: Model<Input = Frame, Output = DetectResult> + 'static,
  M::Error: Display,
  P: Publish + 'static,
  P::Error: Display,
  N: Notify + 'static,
{
  let main_loop = glib::MainLoop::new(None, false);
  let scheduler = Rc::new(RefCell::new(scheduler));

  let first = scheduler.borrow_mut().start(config)?;
  let interrupt = Rc::new(interrupt);
  arm(scheduler.clone(), main_loop.clone(), interrupt, first);

  info!("进入主循环");
  main_loop.run();

  let state = scheduler.borrow().state();
  info!("主循环退出，会话状态: {:?}", state);
  Ok(state)
}

fn arm<O, M, P, N>(
  scheduler: Shared<O, M, P, N>,
  main_loop: glib::MainLoop,
  interrupt: Rc<Option<Receiver<()>>>,
  delay: Duration,
) where
  O: SourceOpener + 'static,
  M: Model<Input = Frame, Output = DetectResult> + 'static,
  M::Error: Display,
  P: Publish + 'static,
  P::Error: Display,
  N: Notify + 'static,
{
  glib::timeout_add_local_once(delay, move || {
    if interrupted(&interrupt) {
      warn!("收到中断信号，停止会话");
      scheduler.borrow_mut().stop();
    }

    let next = scheduler.borrow_mut().tick();
    match next {
      Tick::Again(delay) => arm(scheduler, main_loop, interrupt, delay),
      Tick::Halt => main_loop.quit(),
    }
  });
}

fn interrupted(interrupt: &Option<Receiver<()>>) -> bool {
  match interrupt {
    Some(rx) => match rx.try_recv() {
      Ok(()) | Err(TryRecvError::Disconnected) => true,
      Err(TryRecvError::Empty) => false,
    },
    None => false,
  }
}
