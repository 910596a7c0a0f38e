// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model.rs - 模型与检测结果
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

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;

  /// 模型与配置不匹配之类的错误，换一帧输入也不会恢复
  fn is_fatal(&self, _error: &Self::Error) -> bool {
    false
  }
}

/// 一条检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: usize,
  pub label: String,
  /// 百分比分数，(0, 100]
  pub score: f32,
  pub bbox: [i32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Vec<DetectItem>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self { items }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// 按标签统计条目数量
  pub fn counts(&self) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for item in &self.items {
      *counts.entry(item.label.clone()).or_insert(0) += 1;
    }
    counts
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum PostprocessError {
  #[error("模型输出 {classes} 个类别，但标签表只有 {labels} 个标签")]
  LabelMismatch { classes: usize, labels: usize },
  #[error("模型输出 {outputs} 个检测尺度，但配置了 {anchors} 组 anchor")]
  ScaleMismatch { outputs: usize, anchors: usize },
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
}

mod bound_box;
pub use self::bound_box::BoundBox;

mod decode;
pub use self::decode::{BOX_HEADER_LEN, DecodeError, decode, sigmoid};

mod correct;
pub use self::correct::{Letterbox, correct_boxes, correct_boxes_letterbox};

mod roi;
pub use self::roi::{RegionOfInterest, apply_roi};

mod nms;
pub use self::nms::{iou, suppress};

mod select;
pub use self::select::select_boxes;

mod config;
pub use self::config::{
  ConfigError, DEFAULT_INPUT_SIZE, DEFAULT_NMS_THRESHOLD, DEFAULT_OBJECT_THRESHOLD,
  DetectionConfig, PostprocessConfig,
};

mod yolo3;
pub use self::yolo3::{InferenceBackend, Yolo3, Yolo3Builder, Yolo3Error, Yolo3Postprocessor};

mod replay;
pub use self::replay::{ReplayBackend, ReplayBackendError, TensorDump};
