// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/replay.rs - 回放推理后端
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

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame, model::InferenceBackend, url_path};

#[derive(Error, Debug)]
pub enum ReplayBackendError {
  #[error("回放路径必须使用 {0} 方案")]
  SchemeError(&'static str),
  #[error("回放目录中没有 .json 文件: {0}")]
  Empty(PathBuf),
  #[error("回放文件已用完，共 {0} 个")]
  Exhausted(usize),
  #[error("张量形状 {shape:?} 与数据长度 {len} 不匹配")]
  ShapeMismatch { shape: [usize; 3], len: usize },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 一个检测尺度的原始输出，`data` 按 `shape` 行优先平铺
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDump {
  pub shape: [usize; 3],
  pub data: Vec<f32>,
}

impl TensorDump {
  pub fn from_array(array: &Array3<f32>) -> Self {
    let (h, w, c) = array.dim();
    Self {
      shape: [h, w, c],
      data: array.iter().copied().collect(),
    }
  }

  pub fn into_array(self) -> Result<Array3<f32>, ReplayBackendError> {
    let [h, w, c] = self.shape;
    let len = self.data.len();
    Array3::from_shape_vec((h, w, c), self.data).map_err(|_| ReplayBackendError::ShapeMismatch {
      shape: self.shape,
      len,
    })
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplayFile {
  outputs: Vec<TensorDump>,
}

/// 从磁盘回放事先导出的网络输出
///
/// 指向目录时每次调用按文件名顺序取下一个 `.json`；指向单个文件时每次都返回同一份输出。
#[derive(Debug)]
pub struct ReplayBackend {
  files: Vec<PathBuf>,
  repeat: bool,
  cursor: AtomicUsize,
}

impl ReplayBackend {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReplayBackendError> {
    let path = path.as_ref();
    if path.is_file() {
      info!("回放单个输出文件: {}", path.display());
      return Ok(Self {
        files: vec![path.to_path_buf()],
        repeat: true,
        cursor: AtomicUsize::new(0),
      });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
      let file = entry?.path();
      if file.extension().is_some_and(|ext| ext == "json") {
        files.push(file);
      }
    }
    if files.is_empty() {
      return Err(ReplayBackendError::Empty(path.to_path_buf()));
    }
    files.sort();
    info!("回放目录 {}，共 {} 个输出文件", path.display(), files.len());

    Ok(Self {
      files,
      repeat: false,
      cursor: AtomicUsize::new(0),
    })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  fn next_file(&self) -> Result<&Path, ReplayBackendError> {
    if self.repeat {
      return Ok(&self.files[0]);
    }
    let index = self.cursor.fetch_add(1, Ordering::Relaxed);
    self
      .files
      .get(index)
      .map(PathBuf::as_path)
      .ok_or(ReplayBackendError::Exhausted(self.files.len()))
  }
}

impl FromUrl for ReplayBackend {
  type Error = ReplayBackendError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayBackendError::SchemeError(Self::SCHEME));
    }
    Self::open(url_path(url))
  }
}

impl FromUrlWithScheme for ReplayBackend {
  const SCHEME: &'static str = "replay";
}

impl InferenceBackend for ReplayBackend {
  type Error = ReplayBackendError;

  fn forward(
    &self,
    frame: &RgbNhwcFrame,
    net_w: u32,
    net_h: u32,
  ) -> Result<Vec<Array3<f32>>, Self::Error> {
    let file = self.next_file()?;
    debug!(
      "回放 {}（帧 {}x{}，网络输入 {}x{}）",
      file.display(),
      frame.width(),
      frame.height(),
      net_w,
      net_h
    );
    let replay: ReplayFile = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    replay
      .outputs
      .into_iter()
      .map(TensorDump::into_array)
      .collect()
  }
}
