// 该文件是 Liuguang （流光） 项目的一部分。
// src/input/resolver.rs - 远程视频流地址解析
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

use std::{path::PathBuf, process::Command};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::quality::FormatRule;

#[derive(Error, Debug)]
pub enum ResolveError {
  #[error("无法启动解析程序 {program}: {source}")]
  Spawn {
    program: String,
    source: std::io::Error,
  },
  #[error("解析程序返回失败: {0}")]
  Failed(String),
  #[error("没有可用的媒体地址")]
  NoUsableUrl,
  #[error("媒体地址无效: {0}")]
  InvalidUrl(#[from] url::ParseError),
}

/// 将页面地址与格式规则解析为可直接播放的媒体地址
pub trait StreamResolver {
  fn resolve(&self, source_url: &str, rule: FormatRule) -> Result<Url, ResolveError>;
}

/// 基于 yt-dlp 可执行程序的地址解析器
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
  program: PathBuf,
}

impl Default for YtDlpResolver {
  fn default() -> Self {
    Self {
      program: PathBuf::from("yt-dlp"),
    }
  }
}

impl YtDlpResolver {
  pub fn with_program(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

impl StreamResolver for YtDlpResolver {
  fn resolve(&self, source_url: &str, rule: FormatRule) -> Result<Url, ResolveError> {
    info!("解析视频流地址: {} (格式: {})", source_url, rule);

    let output = Command::new(&self.program)
      .args(["-q", "--no-warnings", "--no-playlist", "-f"])
      .arg(rule.as_str())
      .arg("-g")
      .arg(source_url)
      .output()
      .map_err(|source| ResolveError::Spawn {
        program: self.program.display().to_string(),
        source,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(ResolveError::Failed(stderr.trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let url = first_media_url(&stdout)?;
    debug!("媒体地址: {}", url);
    Ok(url)
  }
}

fn first_media_url(stdout: &str) -> Result<Url, ResolveError> {
  let line = stdout
    .lines()
    .map(str::trim)
    .find(|line| !line.is_empty())
    .ok_or(ResolveError::NoUsableUrl)?;
  Ok(Url::parse(line)?)
}
