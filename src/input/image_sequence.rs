// 该文件是 Yanmu （眼目） 项目的一部分。
// src/input/image_sequence.rs - 图像序列（视频）输入
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame, url_path, url_query};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug)]
pub enum ImageSequenceInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少 fps 参数")]
  MissingFps,
  #[error("fps 无效: {0}")]
  InvalidFps(String),
  #[error("目录中没有图像帧: {0}")]
  Empty(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 以目录中按文件名排序的图像作为视频帧
///
/// 帧率由调用方给出（`folder://frames?fps=30`）；某一帧解码失败时视为视频结束。
pub struct ImageSequenceInput {
  frames: std::vec::IntoIter<PathBuf>,
  total: usize,
  fps: u32,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageSequenceInput {
  type Error = ImageSequenceInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageSequenceInputError::SchemeMismatch);
    }

    let fps = url_query(url, "fps").ok_or(ImageSequenceInputError::MissingFps)?;
    let fps = fps
      .parse::<u32>()
      .map_err(|_| ImageSequenceInputError::InvalidFps(fps.clone()))?;
    Self::open(url_path(url), fps)
  }
}

impl ImageSequenceInput {
  pub fn open<P: AsRef<Path>>(directory: P, fps: u32) -> Result<Self, ImageSequenceInputError> {
    if fps == 0 {
      return Err(ImageSequenceInputError::InvalidFps(fps.to_string()));
    }

    let directory = directory.as_ref();
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      let is_frame = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
      if is_frame {
        frames.push(path);
      }
    }
    if frames.is_empty() {
      return Err(ImageSequenceInputError::Empty(directory.to_path_buf()));
    }
    frames.sort();

    info!(
      "图像序列 {}: {} 帧, {} fps",
      directory.display(),
      frames.len(),
      fps
    );
    Ok(Self {
      total: frames.len(),
      frames: frames.into_iter(),
      fps,
    })
  }

  pub fn fps(&self) -> u32 {
    self.fps
  }

  pub fn total_frames(&self) -> usize {
    self.total
  }
}

impl Iterator for ImageSequenceInput {
  type Item = RgbNhwcFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.frames.next()?;
    let image = ImageReader::open(&path)
      .map_err(image::ImageError::IoError)
      .and_then(|reader| reader.decode());
    match image {
      Ok(image) => {
        debug!("读取帧 {}", path.display());
        Some(RgbNhwcFrame::from(image.to_rgb8()))
      }
      Err(e) => {
        error!("读取帧 {} 失败，视为视频结束: {}", path.display(), e);
        self.frames = Vec::new().into_iter();
        None
      }
    }
  }
}
