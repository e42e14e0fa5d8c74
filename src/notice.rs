// 该文件是 Liuguang （流光） 项目的一部分。
// src/notice.rs - 用户提示
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

use std::sync::mpsc::Sender;

use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Info,
  Error,
}

/// 面向用户的提示消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Info,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Error,
      message: message.into(),
    }
  }
}

pub trait Notify {
  fn notify(&self, notice: Notice);
}

/// 把提示写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notify for LogNotifier {
  fn notify(&self, notice: Notice) {
    match notice.level {
      NoticeLevel::Info => info!("[提示] {}", notice.message),
      NoticeLevel::Error => error!("[错误] {}", notice.message),
    }
  }
}

/// 把提示转发给界面线程
impl Notify for Sender<Notice> {
  fn notify(&self, notice: Notice) {
    if let Err(e) = self.send(notice) {
      LogNotifier.notify(e.0);
    }
  }
}
