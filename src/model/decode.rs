// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/decode.rs - 网格输出解码
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

use ndarray::{ArrayView3, s};
use thiserror::Error;
use tracing::debug;

use crate::model::BoundBox;

/// 每个 anchor 的通道数中，类别分数之前的固定部分：x, y, w, h, objectness
pub const BOX_HEADER_LEN: usize = 5;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("anchor 列表长度无效: {0}（必须为非零偶数）")]
  InvalidAnchors(usize),
  #[error("通道数 {channels} 与 anchor 数量 {num_anchors} 不匹配")]
  ChannelMismatch { channels: usize, num_anchors: usize },
  #[error("网络输入尺寸无效: {0}x{1}")]
  InvalidNetSize(u32, u32),
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 解码一个检测尺度的原始输出
///
/// `tensor` 形状为 `(grid_h, grid_w, num_anchors * (5 + num_classes))`，
/// `anchors` 为该尺度的 `(w, h)` 像素先验，按 anchor 顺序平铺。
/// 返回的框处于归一化坐标，只包含 objectness 大于阈值的网格/anchor 组合；
/// 类别概率为 `objectness * sigmoid(logit)`，不大于阈值的置零。
pub fn decode(
  tensor: ArrayView3<'_, f32>,
  anchors: &[f32],
  obj_threshold: f32,
  net_h: u32,
  net_w: u32,
) -> Result<Vec<BoundBox>, DecodeError> {
  if anchors.is_empty() || anchors.len() % 2 != 0 {
    return Err(DecodeError::InvalidAnchors(anchors.len()));
  }
  if net_h == 0 || net_w == 0 {
    return Err(DecodeError::InvalidNetSize(net_w, net_h));
  }

  let num_anchors = anchors.len() / 2;
  let (grid_h, grid_w, channels) = tensor.dim();
  if channels % num_anchors != 0 || channels / num_anchors <= BOX_HEADER_LEN {
    return Err(DecodeError::ChannelMismatch {
      channels,
      num_anchors,
    });
  }
  let stride = channels / num_anchors;

  let mut boxes = Vec::new();
  for row in 0..grid_h {
    for col in 0..grid_w {
      for b in 0..num_anchors {
        let base = b * stride;
        let cell = tensor.slice(s![row, col, base..base + stride]);

        let objectness = sigmoid(cell[4]);
        if objectness <= obj_threshold {
          continue;
        }

        let cx = (col as f32 + sigmoid(cell[0])) / grid_w as f32;
        let cy = (row as f32 + sigmoid(cell[1])) / grid_h as f32;
        let w = anchors[2 * b] * cell[2].exp() / net_w as f32;
        let h = anchors[2 * b + 1] * cell[3].exp() / net_h as f32;

        let class_scores = cell
          .iter()
          .skip(BOX_HEADER_LEN)
          .map(|&logit| {
            let prob = objectness * sigmoid(logit);
            if prob > obj_threshold { prob } else { 0.0 }
          })
          .collect();

        boxes.push(BoundBox::new(
          cx - w / 2.0,
          cy - h / 2.0,
          cx + w / 2.0,
          cy + h / 2.0,
          objectness,
          class_scores,
        ));
      }
    }
  }

  debug!(
    "网格 {}x{}，{} 个 anchor：解码出 {} 个候选框",
    grid_h,
    grid_w,
    num_anchors,
    boxes.len()
  );
  Ok(boxes)
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array3;

  const ANCHORS: [f32; 6] = [116.0, 90.0, 156.0, 198.0, 373.0, 326.0];
  const NUM_CLASSES: usize = 2;
  const STRIDE: usize = BOX_HEADER_LEN + NUM_CLASSES;

  fn negative_tensor() -> Array3<f32> {
    Array3::from_elem((13, 13, 3 * STRIDE), -10.0)
  }

  #[test]
  fn single_hot_cell_yields_one_box() {
    let mut t = negative_tensor();
    let base = STRIDE; // anchor 1
    t[[6, 4, base]] = 0.0; // sigmoid = 0.5
    t[[6, 4, base + 1]] = 0.0;
    t[[6, 4, base + 2]] = 0.0; // exp = 1
    t[[6, 4, base + 3]] = 0.0;
    t[[6, 4, base + 4]] = 5.0;
    t[[6, 4, base + 6]] = 5.0;

    let boxes = decode(t.view(), &ANCHORS, 0.5, 416, 416).unwrap();
    assert_eq!(boxes.len(), 1);

    let b = &boxes[0];
    assert!(b.objectness() > 0.5);
    let cx = (b.xmin + b.xmax) / 2.0;
    let cy = (b.ymin + b.ymax) / 2.0;
    assert!((cx - 4.5 / 13.0).abs() < 1e-5);
    assert!((cy - 6.5 / 13.0).abs() < 1e-5);
    assert!((b.width() - 156.0 / 416.0).abs() < 1e-5);
    assert!((b.height() - 198.0 / 416.0).abs() < 1e-5);

    assert_eq!(b.class_score(0), 0.0);
    let expected = sigmoid(5.0) * sigmoid(5.0);
    assert!((b.class_score(1) - expected).abs() < 1e-6);
    assert_eq!(b.label(), 1);
  }

  #[test]
  fn output_is_bounded_and_gated_by_objectness() {
    let mut t = Array3::<f32>::zeros((4, 5, 3 * STRIDE));
    for (i, v) in t.iter_mut().enumerate() {
      *v = ((i * 37) % 11) as f32 - 5.0;
    }
    let threshold = 0.3;
    let boxes = decode(t.view(), &ANCHORS, threshold, 416, 416).unwrap();
    assert!(boxes.len() <= 4 * 5 * 3);
    assert!(boxes.iter().all(|b| b.objectness() > threshold));
    for b in &boxes {
      assert!(
        b.class_scores()
          .iter()
          .all(|&s| s == 0.0 || s > threshold)
      );
    }
  }

  #[test]
  fn rejects_mismatched_channels_and_anchors() {
    let t = Array3::<f32>::zeros((2, 2, 20));
    assert_eq!(
      decode(t.view(), &ANCHORS, 0.5, 416, 416),
      Err(DecodeError::ChannelMismatch {
        channels: 20,
        num_anchors: 3
      })
    );
    assert_eq!(
      decode(t.view(), &[1.0, 2.0, 3.0], 0.5, 416, 416),
      Err(DecodeError::InvalidAnchors(3))
    );
  }
}
