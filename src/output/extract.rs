// 该文件是 Yanmu （眼目） 项目的一部分。
// src/output/extract.rs - 检测目标裁剪输出
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

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use image::imageops;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame, model::DetectResult, output::Render, url_path,
};

#[derive(Error, Debug)]
pub enum ExtractObjectsError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把每个检测目标从原始帧中裁剪出来，保存为 `<label>-<nnnnn>.jpg`
pub struct ExtractObjectsOutput {
  directory: PathBuf,
  counter: AtomicU32,
}

impl FromUrlWithScheme for ExtractObjectsOutput {
  const SCHEME: &'static str = "extract";
}

impl FromUrl for ExtractObjectsOutput {
  type Error = ExtractObjectsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ExtractObjectsError::SchemeMismatch);
    }
    Ok(Self::new(url_path(url)))
  }
}

impl ExtractObjectsOutput {
  pub fn new(directory: PathBuf) -> Self {
    Self {
      directory,
      counter: AtomicU32::new(0),
    }
  }

  /// 裁剪并保存，返回写出的文件路径；完全落在图像外的框会被跳过
  pub fn extract(
    &self,
    frame: &RgbNhwcFrame,
    result: &DetectResult,
  ) -> Result<Vec<PathBuf>, ExtractObjectsError> {
    if result.is_empty() {
      return Ok(Vec::new());
    }
    std::fs::create_dir_all(&self.directory)?;

    let image = frame.to_rgb_image();
    let (w, h) = (image.width() as i64, image.height() as i64);
    let mut paths = Vec::with_capacity(result.len());

    for item in &result.items {
      let [xmin, ymin, xmax, ymax] = item.bbox.map(i64::from);
      let (x0, y0) = (xmin.clamp(0, w), ymin.clamp(0, h));
      let (x1, y1) = (xmax.clamp(0, w), ymax.clamp(0, h));
      if x1 <= x0 || y1 <= y0 {
        debug!("{} 的框 {:?} 不在图像内，跳过", item.label, item.bbox);
        continue;
      }

      let crop = imageops::crop_imm(
        &image,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
      )
      .to_image();

      let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
      let path = self.directory.join(format!("{}-{:05}.jpg", item.label, id));
      crop.save(&path)?;
      paths.push(path);
    }

    info!("提取 {} 个目标到 {}", paths.len(), self.directory.display());
    Ok(paths)
  }
}

impl Render<RgbNhwcFrame, DetectResult> for ExtractObjectsOutput {
  type Error = ExtractObjectsError;

  fn render_result(&self, frame: &RgbNhwcFrame, result: &DetectResult) -> Result<(), Self::Error> {
    self.extract(frame, result).map(|_| ())
  }
}
