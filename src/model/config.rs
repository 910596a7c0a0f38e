// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/config.rs - 检测配置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Yanmu Authors

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::RegionOfInterest;

pub const DEFAULT_INPUT_SIZE: u32 = 416;
pub const DEFAULT_OBJECT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("{name} 必须在 [0, 1] 区间内，实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("最小百分比概率必须在 [0, 100] 区间内，实际为 {0}")]
  PercentageOutOfRange(f32),
  #[error("网络输入尺寸必须大于 0")]
  ZeroInputSize,
  #[error("检测配置中没有标签")]
  NoLabels,
  #[error("检测配置中没有 anchor")]
  NoAnchors,
  #[error("第 {scale} 个尺度的 anchor 列表长度无效: {len}")]
  InvalidAnchors { scale: usize, len: usize },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 训练端写出的检测配置：标签表与各尺度的 anchor
///
/// ```json
/// {"labels": ["hololens"], "anchors": [[116, 90, 156, 198, 373, 326], [30, 61, 62, 45, 59, 119], [10, 13, 16, 30, 33, 23]]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
  pub labels: Vec<String>,
  pub anchors: Vec<Vec<f32>>,
}

impl DetectionConfig {
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: DetectionConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    info!("加载检测配置: {}", path.as_ref().display());
    let json = std::fs::read_to_string(path)?;
    let config = Self::from_json_str(&json)?;
    info!(
      "检测配置: {} 个标签, {} 个检测尺度",
      config.labels.len(),
      config.anchors.len()
    );
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.labels.is_empty() {
      return Err(ConfigError::NoLabels);
    }
    if self.anchors.is_empty() {
      return Err(ConfigError::NoAnchors);
    }
    for (scale, anchors) in self.anchors.iter().enumerate() {
      if anchors.is_empty() || anchors.len() % 2 != 0 {
        return Err(ConfigError::InvalidAnchors {
          scale,
          len: anchors.len(),
        });
      }
    }
    Ok(())
  }
}

/// 后处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
  object_threshold: f32,
  nms_threshold: f32,
  input_size: u32,
  region_of_interest: Option<RegionOfInterest>,
}

impl Default for PostprocessConfig {
  fn default() -> Self {
    Self {
      object_threshold: DEFAULT_OBJECT_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      input_size: DEFAULT_INPUT_SIZE,
      region_of_interest: None,
    }
  }
}

fn check_unit(name: &'static str, value: f32) -> Result<f32, ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

impl PostprocessConfig {
  pub fn new(object_threshold: f32, nms_threshold: f32) -> Result<Self, ConfigError> {
    Ok(Self {
      object_threshold: check_unit("object_threshold", object_threshold)?,
      nms_threshold: check_unit("nms_threshold", nms_threshold)?,
      ..Default::default()
    })
  }

  /// 以 [0, 100] 的最小百分比概率设置目标阈值
  pub fn with_minimum_percentage(mut self, percentage: f32) -> Result<Self, ConfigError> {
    if !(0.0..=100.0).contains(&percentage) {
      return Err(ConfigError::PercentageOutOfRange(percentage));
    }
    if percentage < 1.0 {
      warn!(
        "最小百分比概率为 {}%，如果本意是 {}%，请中断后重新运行",
        percentage,
        percentage * 100.0
      );
    }
    self.object_threshold = percentage / 100.0;
    Ok(self)
  }

  pub fn with_nms_threshold(mut self, nms_threshold: f32) -> Result<Self, ConfigError> {
    self.nms_threshold = check_unit("nms_threshold", nms_threshold)?;
    Ok(self)
  }

  pub fn with_input_size(mut self, input_size: u32) -> Result<Self, ConfigError> {
    if input_size == 0 {
      return Err(ConfigError::ZeroInputSize);
    }
    self.input_size = input_size;
    Ok(self)
  }

  pub fn with_region_of_interest(mut self, roi: Option<RegionOfInterest>) -> Self {
    self.region_of_interest = roi;
    self
  }

  pub fn object_threshold(&self) -> f32 {
    self.object_threshold
  }

  pub fn nms_threshold(&self) -> f32 {
    self.nms_threshold
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn region_of_interest(&self) -> Option<&RegionOfInterest> {
    self.region_of_interest.as_ref()
  }
}
