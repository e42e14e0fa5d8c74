// 该文件是 Liuguang （流光） 项目的一部分。
// src/quality.rs - 画质选项与格式选择规则
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

use std::{convert::Infallible, fmt, str::FromStr};

use tracing::debug;

/// 远程流的画质偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityPreference {
  /// 最高画质（默认）
  #[default]
  High,
  /// 中等画质，分辨率不超过 480p
  Medium,
  /// 最低画质
  Low,
}

/// 打开远程流时使用的格式选择规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatRule(&'static str);

const HIGH_RULE: FormatRule = FormatRule("best[ext=mp4]");
const MEDIUM_RULE: FormatRule = FormatRule("best[height<=480][ext=mp4]");
const LOW_RULE: FormatRule = FormatRule("worst[ext=mp4]");

impl FormatRule {
  pub fn as_str(&self) -> &'static str {
    self.0
  }
}

impl fmt::Display for FormatRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

impl QualityPreference {
  /// 按名称查找画质，未知名称回退为 [`QualityPreference::High`]
  pub fn from_name(name: &str) -> Self {
    match name.trim().to_ascii_lowercase().as_str() {
      "high" | "best" => QualityPreference::High,
      "medium" => QualityPreference::Medium,
      "low" | "worst" => QualityPreference::Low,
      other => {
        debug!("未知画质选项 '{}'，使用默认画质", other);
        QualityPreference::default()
      }
    }
  }

  pub fn format_rule(self) -> FormatRule {
    match self {
      QualityPreference::High => HIGH_RULE,
      QualityPreference::Medium => MEDIUM_RULE,
      QualityPreference::Low => LOW_RULE,
    }
  }
}

impl FromStr for QualityPreference {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::from_name(s))
  }
}

impl fmt::Display for QualityPreference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      QualityPreference::High => "high",
      QualityPreference::Medium => "medium",
      QualityPreference::Low => "low",
    };
    f.write_str(name)
  }
}

/// 画质名称到格式规则的查表
pub fn resolve(name: &str) -> FormatRule {
  QualityPreference::from_name(name).format_rule()
}
