// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/bound_box.rs - 候选检测框
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

/// 一个候选检测区域
///
/// 坐标空间取决于所处阶段：解码后为归一化坐标 [0, 1]，经过坐标校正后为像素坐标。
/// `label` 与 `score` 在构造时根据解码出的类别分数一次性计算，之后不再变化；
/// RoI 过滤与 NMS 只会把 `class_scores` 中的条目置零。
#[derive(Debug, Clone, PartialEq)]
pub struct BoundBox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
  objectness: f32,
  class_scores: Box<[f32]>,
  label: usize,
  score: f32,
}

impl BoundBox {
  pub fn new(
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
    objectness: f32,
    class_scores: Vec<f32>,
  ) -> Self {
    let (label, score) = argmax(&class_scores);
    Self {
      xmin,
      ymin,
      xmax,
      ymax,
      objectness,
      class_scores: class_scores.into_boxed_slice(),
      label,
      score,
    }
  }

  pub fn objectness(&self) -> f32 {
    self.objectness
  }

  pub fn class_scores(&self) -> &[f32] {
    &self.class_scores
  }

  pub fn class_score(&self, class: usize) -> f32 {
    self.class_scores.get(class).copied().unwrap_or(0.0)
  }

  /// 将某个类别的分数置零，越界时忽略
  pub fn zero_class(&mut self, class: usize) {
    if let Some(score) = self.class_scores.get_mut(class) {
      *score = 0.0;
    }
  }

  pub fn zero_all_classes(&mut self) {
    self.class_scores.iter_mut().for_each(|s| *s = 0.0);
  }

  pub fn has_any_score(&self) -> bool {
    self.class_scores.iter().any(|&s| s != 0.0)
  }

  pub fn num_classes(&self) -> usize {
    self.class_scores.len()
  }

  /// 解码时分数最高的类别索引
  pub fn label(&self) -> usize {
    self.label
  }

  /// 解码时最高的类别分数
  pub fn score(&self) -> f32 {
    self.score
  }

  pub fn width(&self) -> f32 {
    self.xmax - self.xmin
  }

  pub fn height(&self) -> f32 {
    self.ymax - self.ymin
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// 整数中心点（向零截断）
  pub fn centroid(&self) -> (i64, i64) {
    (
      ((self.xmax + self.xmin) / 2.0) as i64,
      ((self.ymax + self.ymin) / 2.0) as i64,
    )
  }
}

// 与 numpy.argmax 一致：并列时取第一个
fn argmax(scores: &[f32]) -> (usize, f32) {
  let mut best = (0usize, scores.first().copied().unwrap_or(0.0));
  for (idx, &score) in scores.iter().enumerate().skip(1) {
    if score > best.1 {
      best = (idx, score);
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_and_score_come_from_the_highest_class() {
    let b = BoundBox::new(0.0, 0.0, 1.0, 1.0, 0.9, vec![0.1, 0.7, 0.7, 0.2]);
    assert_eq!(b.label(), 1);
    assert_eq!(b.score(), 0.7);
  }

  #[test]
  fn label_is_fixed_after_zeroing() {
    let mut b = BoundBox::new(0.0, 0.0, 1.0, 1.0, 0.9, vec![0.1, 0.8]);
    b.zero_class(1);
    assert_eq!(b.label(), 1);
    assert_eq!(b.score(), 0.8);
    assert_eq!(b.class_score(1), 0.0);
    assert!(b.has_any_score());
    b.zero_all_classes();
    assert!(!b.has_any_score());
    assert_eq!(b.num_classes(), 2);
  }

  #[test]
  fn centroid_truncates_toward_zero() {
    let b = BoundBox::new(101.0, 50.0, 200.0, 151.0, 1.0, vec![1.0]);
    assert_eq!(b.centroid(), (150, 100));
    let n = BoundBox::new(-3.0, -3.0, 0.0, 0.0, 1.0, vec![1.0]);
    assert_eq!(n.centroid(), (-1, -1));
  }
}
