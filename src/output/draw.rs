// 该文件是 Yanmu （眼目） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::info;

use crate::{
  frame::RgbNhwcFrame,
  model::{DetectItem, DetectResult, RegionOfInterest},
};

const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const ROI_THICKNESS: i32 = 3;
const ROI_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在帧上绘制检测框、标签与感兴趣区域
///
/// 标签文字需要通过 [`Draw::with_font_file`] 提供字体，没有字体时只画框。
/// 克隆时共享已加载的字体。
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  show_names: bool,
  show_percentage: bool,
  region_of_interest: Option<RegionOfInterest>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      show_names: true,
      show_percentage: true,
      region_of_interest: None,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 同一类别总是同一颜色，相邻类别的色相间隔约 137.5°
pub fn label_color(class_id: usize) -> Rgb<u8> {
  let hue = (class_id as f32 * 137.508) % 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

impl Draw {
  pub fn with_font_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    self.font = Some(FontArc::try_from_vec(data)?);
    info!("加载标签字体: {}", path.as_ref().display());
    Ok(self)
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn with_show_names(mut self, show_names: bool) -> Self {
    self.show_names = show_names;
    self
  }

  pub fn with_show_percentage(mut self, show_percentage: bool) -> Self {
    self.show_percentage = show_percentage;
    self
  }

  pub fn with_region_of_interest(mut self, roi: Option<RegionOfInterest>) -> Self {
    self.region_of_interest = roi;
    self
  }

  pub fn caption(&self, item: &DetectItem) -> Option<String> {
    match (self.show_names, self.show_percentage) {
      (true, true) => Some(format!("{} : {:.2}", item.label, item.score)),
      (true, false) => Some(item.label.clone()),
      (false, true) => Some(format!("{:.2}", item.score)),
      (false, false) => None,
    }
  }

  /// 画一个逐像素向内加粗的矩形，超出图像的部分裁掉
  fn draw_thick_rect(image: &mut RgbImage, bbox: [i32; 4], thickness: i32, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x_min = bbox[0].clamp(0, w - 1);
    let y_min = bbox[1].clamp(0, h - 1);
    let x_max = bbox[2].clamp(0, w - 1);
    let y_max = bbox[3].clamp(0, h - 1);

    for t in 0..thickness {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn draw_caption(&self, image: &mut RgbImage, item: &DetectItem, color: Rgb<u8>) {
    let (Some(font), Some(caption)) = (self.font.as_ref(), self.caption(item)) else {
      return;
    };

    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &caption);
    let text_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    let label_x = item.bbox[0].clamp(0, image.width() as i32 - 1);
    let label_y = (item.bbox[1] - text_h).max(0);
    let max_width = (image.width() as i32 - label_x).max(0) as u32;
    let label_width = text_w.min(max_width);

    if label_width > 0 && text_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, text_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        TEXT_COLOR,
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &caption,
      );
    }
  }

  pub fn draw_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }

    if let Some(roi) = self.region_of_interest {
      let bbox = [roi.xmin, roi.ymin, roi.xmax, roi.ymax].map(|v| v.clamp(0, i32::MAX as i64) as i32);
      Self::draw_thick_rect(image, bbox, ROI_THICKNESS, ROI_COLOR);
    }

    for item in &result.items {
      let color = label_color(item.class_id);
      Self::draw_thick_rect(image, item.bbox, BOX_THICKNESS, color);
      self.draw_caption(image, item, color);
    }
  }

  pub fn draw_detection(&self, frame: &RgbNhwcFrame, result: &DetectResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_on_image(&mut image, result);
    image
  }
}

/// 每个条目一行 `label, score, xmin, ymin, xmax, ymax`，写到与图像同名的 `.txt`
pub struct Record;

impl Record {
  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    let records: Vec<String> = result
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {}, {}, {}, {}",
          item.label, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: usize, bbox: [i32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      label: "person".to_string(),
      score: 87.5,
      bbox,
    }
  }

  #[test]
  fn box_outline_is_two_pixels_in_label_colour() {
    let frame = RgbNhwcFrame::with_shape(40, 40);
    let result = DetectResult::new(vec![item(3, [5, 5, 30, 30])]);
    let image = Draw::default().draw_detection(&frame, &result);

    let color = label_color(3);
    assert_eq!(*image.get_pixel(5, 10), color);
    assert_eq!(*image.get_pixel(6, 10), color);
    assert_eq!(*image.get_pixel(7, 10), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(15, 15), Rgb([0, 0, 0]));
  }

  #[test]
  fn region_of_interest_is_outlined_in_black() {
    let mut image = RgbImage::from_pixel(50, 50, Rgb([200, 200, 200]));
    let draw = Draw::default().with_region_of_interest(Some(RegionOfInterest::new(10, 40, 10, 40)));
    draw.draw_on_image(&mut image, &DetectResult::default());
    assert_eq!(*image.get_pixel(10, 20), ROI_COLOR);
    assert_eq!(*image.get_pixel(12, 20), ROI_COLOR);
    assert_eq!(*image.get_pixel(13, 20), Rgb([200, 200, 200]));
  }

  #[test]
  fn boxes_outside_the_image_do_not_panic() {
    let frame = RgbNhwcFrame::with_shape(10, 10);
    let result = DetectResult::new(vec![item(0, [-50, -50, 500, 500]), item(1, [8, 8, 8, 8])]);
    let image = Draw::default().draw_detection(&frame, &result);
    assert_eq!(image.dimensions(), (10, 10));
  }

  #[test]
  fn caption_follows_display_flags() {
    let it = item(0, [0, 0, 1, 1]);
    assert_eq!(Draw::default().caption(&it).as_deref(), Some("person : 87.50"));
    assert_eq!(
      Draw::default().with_show_percentage(false).caption(&it).as_deref(),
      Some("person")
    );
    assert_eq!(
      Draw::default().with_show_names(false).caption(&it).as_deref(),
      Some("87.50")
    );
    assert!(
      Draw::default()
        .with_show_names(false)
        .with_show_percentage(false)
        .caption(&it)
        .is_none()
    );
  }

  #[test]
  fn clone_keeps_display_flags() {
    let draw = Draw::default()
      .with_show_names(false)
      .with_region_of_interest(Some(RegionOfInterest::new(10, 40, 10, 40)));
    let copy = draw.clone();
    let it = item(0, [0, 0, 1, 1]);
    assert_eq!(copy.caption(&it), draw.caption(&it));
    assert_eq!(copy.region_of_interest, draw.region_of_interest);
  }

  #[test]
  fn colours_are_stable_per_class() {
    assert_eq!(label_color(7), label_color(7));
    assert_ne!(label_color(0), label_color(1));
  }
}
