// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::BoundBox;

/// 一维区间 `[a0, a1]` 与 `[b0, b1]` 的重叠长度
fn interval_overlap((a0, a1): (f32, f32), (b0, b1): (f32, f32)) -> f32 {
  if b0 < a0 {
    if b1 < a0 { 0.0 } else { a1.min(b1) - a0 }
  } else if a1 < b0 {
    0.0
  } else {
    a1.min(b1) - b0
  }
}

/// 计算两个边界框的 IoU，并集面积为 0 时返回 0
pub fn iou(a: &BoundBox, b: &BoundBox) -> f32 {
  let intersect_w = interval_overlap((a.xmin, a.xmax), (b.xmin, b.xmax));
  let intersect_h = interval_overlap((a.ymin, a.ymax), (b.ymin, b.ymax));
  let intersect = intersect_w * intersect_h;
  let union = a.area() + b.area() - intersect;

  if union > 0.0 && union.is_finite() {
    intersect / union
  } else {
    0.0
  }
}

/// 按类别逐一做贪心抑制（就地修改）
///
/// 对每个类别按分数降序（分数相同按原顺序）遍历，分数非零的框把其后
/// IoU 不小于阈值的框在该类别上的分数置零；其他类别不受影响。
pub fn suppress(boxes: &mut [BoundBox], iou_threshold: f32) {
  let Some(num_classes) = boxes.first().map(BoundBox::num_classes) else {
    return;
  };

  let mut order: Vec<usize> = (0..boxes.len()).collect();
  for c in 0..num_classes {
    order.sort_by(|&i, &j| {
      boxes[j]
        .class_score(c)
        .total_cmp(&boxes[i].class_score(c))
        .then(i.cmp(&j))
    });

    for (pos, &i) in order.iter().enumerate() {
      if boxes[i].class_score(c) == 0.0 {
        continue;
      }
      for &j in &order[pos + 1..] {
        if iou(&boxes[i], &boxes[j]) >= iou_threshold {
          boxes[j].zero_class(c);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(xmin: f32, ymin: f32, xmax: f32, ymax: f32, scores: Vec<f32>) -> BoundBox {
    BoundBox::new(xmin, ymin, xmax, ymax, 1.0, scores)
  }

  #[test]
  fn iou_of_disjoint_and_identical_boxes() {
    let a = bbox(0.0, 0.0, 10.0, 10.0, vec![1.0]);
    let b = bbox(20.0, 20.0, 30.0, 30.0, vec![1.0]);
    let c = bbox(10.0, 0.0, 20.0, 10.0, vec![1.0]);
    assert_eq!(iou(&a, &b), 0.0);
    assert_eq!(iou(&a, &c), 0.0);
    assert_eq!(iou(&a, &a.clone()), 1.0);
  }

  #[test]
  fn iou_of_partial_overlap() {
    let a = bbox(0.0, 0.0, 10.0, 10.0, vec![1.0]);
    let b = bbox(5.0, 0.0, 15.0, 10.0, vec![1.0]);
    assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    assert_eq!(iou(&a, &b), iou(&b, &a));
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    let p = bbox(3.0, 3.0, 3.0, 3.0, vec![1.0]);
    assert_eq!(iou(&p, &p.clone()), 0.0);
    let line = bbox(0.0, 5.0, 10.0, 5.0, vec![1.0]);
    assert_eq!(iou(&line, &p), 0.0);
  }

  #[test]
  fn lower_scored_duplicate_is_suppressed() {
    // 两框 IoU = 0.9
    let mut boxes = vec![
      bbox(0.0, 0.0, 100.0, 100.0, vec![0.8]),
      bbox(0.0, 0.0, 100.0, 90.0, vec![0.9]),
    ];
    assert!((iou(&boxes[0], &boxes[1]) - 0.9).abs() < 1e-6);
    suppress(&mut boxes, 0.45);
    assert_eq!(boxes[0].class_score(0), 0.0);
    assert_eq!(boxes[1].class_score(0), 0.9);
  }

  #[test]
  fn suppression_is_per_class() {
    let mut boxes = vec![
      bbox(0.0, 0.0, 10.0, 10.0, vec![0.9, 0.2]),
      bbox(0.0, 0.0, 10.0, 10.0, vec![0.7, 0.6]),
    ];
    suppress(&mut boxes, 0.5);
    assert_eq!(boxes[0].class_scores(), &[0.9, 0.0]);
    assert_eq!(boxes[1].class_scores(), &[0.0, 0.6]);
  }

  #[test]
  fn ties_keep_the_earlier_box() {
    let mut boxes = vec![
      bbox(0.0, 0.0, 10.0, 10.0, vec![0.7]),
      bbox(1.0, 0.0, 11.0, 10.0, vec![0.7]),
    ];
    suppress(&mut boxes, 0.5);
    assert_eq!(boxes[0].class_score(0), 0.7);
    assert_eq!(boxes[1].class_score(0), 0.0);
  }

  #[test]
  fn survivors_do_not_overlap_above_threshold() {
    let threshold = 0.45;
    let mut boxes: Vec<BoundBox> = (0..24)
      .map(|i| {
        let x = (i % 6) as f32 * 7.0;
        let y = (i / 6) as f32 * 5.0;
        let score = 0.3 + ((i * 13) % 17) as f32 / 30.0;
        bbox(x, y, x + 20.0, y + 16.0, vec![score, 1.0 - score])
      })
      .collect();
    suppress(&mut boxes, threshold);

    for c in 0..2 {
      let alive: Vec<&BoundBox> = boxes.iter().filter(|b| b.class_score(c) > 0.0).collect();
      assert!(!alive.is_empty());
      for (i, a) in alive.iter().enumerate() {
        for b in &alive[i + 1..] {
          assert!(iou(a, b) < threshold);
        }
      }
    }
  }

  #[test]
  fn empty_input_is_fine() {
    let mut boxes: Vec<BoundBox> = Vec::new();
    suppress(&mut boxes, 0.5);
    assert!(boxes.is_empty());
  }
}
