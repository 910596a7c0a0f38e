// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/correct.rs - 坐标校正
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

use tracing::warn;

use crate::model::BoundBox;

/// 方形网络输入到原图的 letterbox 逆变换参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub x_offset: f32,
  pub x_scale: f32,
  pub y_offset: f32,
  pub y_scale: f32,
}

impl Letterbox {
  /// 图像被缩放到 `resized_w x resized_h` 后居中贴入 `net_w x net_h` 画布
  pub fn new(net_w: u32, net_h: u32, resized_w: u32, resized_h: u32) -> Self {
    let (net_w, net_h) = (net_w as f32, net_h as f32);
    let (resized_w, resized_h) = (resized_w as f32, resized_h as f32);
    Self {
      x_offset: (net_w - resized_w) / 2.0 / net_w,
      x_scale: resized_w / net_w,
      y_offset: (net_h - resized_h) / 2.0 / net_h,
      y_scale: resized_h / net_h,
    }
  }

  /// 直接缩放到网络尺寸（不加边）时的恒等变换
  pub fn identity() -> Self {
    Self {
      x_offset: 0.0,
      x_scale: 1.0,
      y_offset: 0.0,
      y_scale: 1.0,
    }
  }

  pub fn is_identity(&self) -> bool {
    self.x_offset == 0.0 && self.y_offset == 0.0 && self.x_scale == 1.0 && self.y_scale == 1.0
  }

  fn to_pixel_x(&self, x: f32, image_w: u32) -> f32 {
    (((x - self.x_offset) / self.x_scale) * image_w as f32).trunc()
  }

  fn to_pixel_y(&self, y: f32, image_h: u32) -> f32 {
    (((y - self.y_offset) / self.y_scale) * image_h as f32).trunc()
  }
}

/// 把归一化坐标映射回原图像素坐标（就地修改）
///
/// 当前部署直接把图像缩放到网络尺寸，所以变换退化为按原图尺寸相乘后截断。
pub fn correct_boxes(boxes: &mut [BoundBox], image_h: u32, image_w: u32, net_h: u32, net_w: u32) {
  correct_boxes_letterbox(boxes, image_h, image_w, net_h, net_w, net_h, net_w);
}

/// 通用的 letterbox 逆变换
///
/// 下游像素计算默认假设变换为恒等，偏移或缩放不为恒等时输出告警。
pub fn correct_boxes_letterbox(
  boxes: &mut [BoundBox],
  image_h: u32,
  image_w: u32,
  net_h: u32,
  net_w: u32,
  resized_h: u32,
  resized_w: u32,
) {
  let letterbox = Letterbox::new(net_w, net_h, resized_w, resized_h);
  if !letterbox.is_identity() {
    warn!(
      "坐标校正的偏移/缩放不是恒等变换: x-off {}, y-off {}, x-scale {}, y-scale {}",
      letterbox.x_offset, letterbox.y_offset, letterbox.x_scale, letterbox.y_scale
    );
  }

  for b in boxes.iter_mut() {
    b.xmin = letterbox.to_pixel_x(b.xmin, image_w);
    b.xmax = letterbox.to_pixel_x(b.xmax, image_w);
    b.ymin = letterbox.to_pixel_y(b.ymin, image_h);
    b.ymax = letterbox.to_pixel_y(b.ymax, image_h);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct CapturedLog(Arc<Mutex<Vec<u8>>>);

  impl std::io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  fn logs_of(f: impl FnOnce()) -> String {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = log.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
  }

  fn centred_box() -> BoundBox {
    BoundBox::new(0.45, 0.45, 0.55, 0.55, 0.9, vec![0.9])
  }

  #[test]
  fn centred_box_maps_to_image_centre() {
    for &(w, h) in &[(640u32, 480u32), (1920, 1080), (416, 416), (123, 457)] {
      let mut boxes = vec![centred_box()];
      correct_boxes(&mut boxes, h, w, 416, 416);
      let b = &boxes[0];
      let (cx, cy) = ((b.xmin + b.xmax) / 2.0, (b.ymin + b.ymax) / 2.0);
      assert!((cx - w as f32 / 2.0).abs() <= 1.0, "cx {} for {}x{}", cx, w, h);
      assert!((cy - h as f32 / 2.0).abs() <= 1.0, "cy {} for {}x{}", cy, w, h);
      assert!((b.width() - 0.1 * w as f32).abs() <= 1.0);
      assert!((b.height() - 0.1 * h as f32).abs() <= 1.0);
      assert_eq!(b.xmin, b.xmin.trunc());
      assert!(b.xmin <= b.xmax && b.ymin <= b.ymax);
    }
  }

  #[test]
  fn letterbox_inverts_padding() {
    // 640x320 的图像缩放到 416x208 后贴入 416x416 画布
    let letterbox = Letterbox::new(416, 416, 416, 208);
    assert!(!letterbox.is_identity());
    assert_eq!(letterbox.y_offset, 0.25);
    assert_eq!(letterbox.y_scale, 0.5);

    let mut boxes = vec![BoundBox::new(0.25, 0.25, 0.75, 0.75, 0.9, vec![0.9])];
    correct_boxes_letterbox(&mut boxes, 320, 640, 416, 416, 208, 416);
    let b = &boxes[0];
    assert_eq!((b.xmin, b.xmax), (160.0, 480.0));
    assert_eq!((b.ymin, b.ymax), (0.0, 320.0));
  }

  #[test]
  fn identity_when_resized_to_network() {
    assert!(Letterbox::new(416, 416, 416, 416).is_identity());
    assert_eq!(Letterbox::new(416, 416, 416, 416), Letterbox::identity());
  }

  #[test]
  fn only_non_identity_transform_warns() {
    let padded = logs_of(|| {
      let mut boxes = vec![centred_box()];
      correct_boxes_letterbox(&mut boxes, 320, 640, 416, 416, 208, 416);
    });
    assert!(padded.contains("WARN"));
    assert!(padded.contains("不是恒等变换"));

    let resized = logs_of(|| {
      let mut boxes = vec![centred_box()];
      correct_boxes(&mut boxes, 480, 640, 416, 416);
    });
    assert!(resized.is_empty());
  }
}
