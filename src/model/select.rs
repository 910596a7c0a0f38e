// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/select.rs - 结果筛选
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

use crate::model::{BoundBox, DetectItem, PostprocessError};

/// 把类别分数超过阈值的 (框, 类别) 组合转换为输出条目
///
/// 一个框可以产生多个条目；分数换算为百分比。
/// 类别分数向量比标签表长时说明模型与配置不匹配，直接报错。
pub fn select_boxes(
  boxes: &[BoundBox],
  labels: &[String],
  threshold: f32,
) -> Result<Vec<DetectItem>, PostprocessError> {
  let mut items = Vec::new();
  for b in boxes {
    if b.num_classes() > labels.len() {
      return Err(PostprocessError::LabelMismatch {
        classes: b.num_classes(),
        labels: labels.len(),
      });
    }

    for (class_id, &score) in b.class_scores().iter().enumerate() {
      if score > threshold {
        items.push(DetectItem {
          class_id,
          label: labels[class_id].clone(),
          score: score * 100.0,
          bbox: [
            b.xmin as i32,
            b.ymin as i32,
            b.xmax as i32,
            b.ymax as i32,
          ],
        });
      }
    }
  }
  Ok(items)
}
