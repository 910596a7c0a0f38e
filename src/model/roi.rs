// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/roi.rs - 感兴趣区域过滤
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

use serde::{Deserialize, Serialize};

use crate::model::BoundBox;

/// 像素坐标的感兴趣区域，顺序为 `[xmin, xmax, ymin, ymax]`，右/下边界不包含
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
  pub xmin: i64,
  pub xmax: i64,
  pub ymin: i64,
  pub ymax: i64,
}

impl RegionOfInterest {
  pub fn new(xmin: i64, xmax: i64, ymin: i64, ymax: i64) -> Self {
    Self {
      xmin,
      xmax,
      ymin,
      ymax,
    }
  }

  /// 只有恰好四个坐标时才构成有效区域
  pub fn from_slice(coords: &[i64]) -> Option<Self> {
    match coords {
      &[xmin, xmax, ymin, ymax] => Some(Self::new(xmin, xmax, ymin, ymax)),
      _ => None,
    }
  }

  pub fn contains(&self, x: i64, y: i64) -> bool {
    (self.xmin..self.xmax).contains(&x) && (self.ymin..self.ymax).contains(&y)
  }
}

/// 中心点落在区域外的框，所有类别分数置零（框本身保留）
///
/// 区域缺失时不做任何处理。
pub fn apply_roi(boxes: &mut [BoundBox], roi: Option<&RegionOfInterest>) {
  let Some(roi) = roi else {
    return;
  };

  for b in boxes.iter_mut().filter(|b| b.has_any_score()) {
    let (cx, cy) = b.centroid();
    if !roi.contains(cx, cy) {
      b.zero_all_classes();
    }
  }
}
