// 该文件是 Yanmu （眼目） 项目的一部分。
// src/model/yolo3.rs - YOLOv3 检测模型
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

use ndarray::Array3;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  model::{
    ConfigError, DetectResult, DetectionConfig, Model, PostprocessConfig, PostprocessError,
    ReplayBackend, ReplayBackendError, apply_roi, correct_boxes, decode, select_boxes, suppress,
  },
  url_path, url_query,
};

/// 外部推理运行时的接入点
///
/// 输入原始帧与网络输入尺寸，输出每个检测尺度一个
/// `(grid_h, grid_w, num_anchors * (5 + num_classes))` 张量，顺序与 anchor 配置一致。
pub trait InferenceBackend {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward(
    &self,
    frame: &RgbNhwcFrame,
    net_w: u32,
    net_h: u32,
  ) -> Result<Vec<Array3<f32>>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum Yolo3Error {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("后处理错误: {0}")]
  Postprocess(#[from] PostprocessError),
  #[error("推理后端错误: {0}")]
  Backend(Box<dyn std::error::Error + Send + Sync>),
  #[error("回放后端错误: {0}")]
  Replay(#[from] ReplayBackendError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("缺少推理后端，请通过 backend 参数指定")]
  MissingBackend,
  #[error("URL 解析错误: {0}")]
  UrlError(#[from] url::ParseError),
}

/// 静态图像后处理流水线：解码 → 坐标校正 → 区域过滤 → NMS → 筛选
#[derive(Debug, Clone)]
pub struct Yolo3Postprocessor {
  detection: DetectionConfig,
  config: PostprocessConfig,
}

impl Yolo3Postprocessor {
  pub fn new(detection: DetectionConfig, config: PostprocessConfig) -> Self {
    Self { detection, config }
  }

  pub fn labels(&self) -> &[String] {
    &self.detection.labels
  }

  pub fn config(&self) -> &PostprocessConfig {
    &self.config
  }

  pub fn postprocess(
    &self,
    outputs: &[Array3<f32>],
    image_w: u32,
    image_h: u32,
  ) -> Result<DetectResult, PostprocessError> {
    if outputs.len() != self.detection.anchors.len() {
      return Err(PostprocessError::ScaleMismatch {
        outputs: outputs.len(),
        anchors: self.detection.anchors.len(),
      });
    }

    let net = self.config.input_size();
    let threshold = self.config.object_threshold();

    let mut boxes = Vec::new();
    for (tensor, anchors) in outputs.iter().zip(&self.detection.anchors) {
      boxes.extend(decode(tensor.view(), anchors, threshold, net, net)?);
    }
    debug!("所有尺度共解码出 {} 个候选框", boxes.len());

    correct_boxes(&mut boxes, image_h, image_w, net, net);
    apply_roi(&mut boxes, self.config.region_of_interest());
    suppress(&mut boxes, self.config.nms_threshold());

    let items = select_boxes(&boxes, &self.detection.labels, threshold)?;
    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::new(items))
  }
}

pub struct Yolo3<B> {
  backend: B,
  postprocessor: Yolo3Postprocessor,
}

impl<B: InferenceBackend> Yolo3<B> {
  pub fn new(backend: B, postprocessor: Yolo3Postprocessor) -> Self {
    Self {
      backend,
      postprocessor,
    }
  }

  pub fn postprocessor(&self) -> &Yolo3Postprocessor {
    &self.postprocessor
  }
}

impl<B: InferenceBackend> Model for Yolo3<B> {
  type Input = RgbNhwcFrame;
  type Output = DetectResult;
  type Error = Yolo3Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let net = self.postprocessor.config().input_size();
    debug!("执行模型推理，网络输入 {}x{}", net, net);
    let outputs = self
      .backend
      .forward(input, net, net)
      .map_err(|e| Yolo3Error::Backend(Box::new(e)))?;

    debug!("后处理 {} 个检测尺度的输出", outputs.len());
    Ok(
      self
        .postprocessor
        .postprocess(&outputs, input.width() as u32, input.height() as u32)?,
    )
  }

  /// 后处理错误都来自张量形状、anchor 或标签表与配置不符
  fn is_fatal(&self, error: &Self::Error) -> bool {
    matches!(error, Yolo3Error::Postprocess(_) | Yolo3Error::Config(_))
  }
}

/// 通过 `yolo3://detection_config.json?backend=replay://dir` 构造模型
pub struct Yolo3Builder {
  config_path: PathBuf,
  backend: Option<Url>,
  postprocess: PostprocessConfig,
}

impl FromUrl for Yolo3Builder {
  type Error = Yolo3Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo3Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let backend = url_query(url, "backend")
      .map(|backend| Url::parse(&backend))
      .transpose()?;

    Ok(Yolo3Builder {
      config_path: url_path(url),
      backend,
      postprocess: PostprocessConfig::default(),
    })
  }
}

impl FromUrlWithScheme for Yolo3Builder {
  const SCHEME: &'static str = "yolo3";
}

impl Yolo3Builder {
  pub fn postprocess(mut self, postprocess: PostprocessConfig) -> Self {
    self.postprocess = postprocess;
    self
  }

  fn load_postprocessor(&self) -> Result<Yolo3Postprocessor, Yolo3Error> {
    let detection = DetectionConfig::from_file(&self.config_path)?;
    info!(
      "后处理参数: 目标阈值 {}, NMS 阈值 {}, 网络输入 {}",
      self.postprocess.object_threshold(),
      self.postprocess.nms_threshold(),
      self.postprocess.input_size()
    );
    Ok(Yolo3Postprocessor::new(detection, self.postprocess.clone()))
  }

  /// 使用 URL 中 `backend` 参数指定的回放后端
  pub fn build(self) -> Result<Yolo3<ReplayBackend>, Yolo3Error> {
    let backend_url = self.backend.as_ref().ok_or(Yolo3Error::MissingBackend)?;
    let backend = ReplayBackend::from_url(backend_url)?;
    let postprocessor = self.load_postprocessor()?;
    info!("模型加载完成");
    Ok(Yolo3::new(backend, postprocessor))
  }

  pub fn build_with_backend<B: InferenceBackend>(self, backend: B) -> Result<Yolo3<B>, Yolo3Error> {
    let postprocessor = self.load_postprocessor()?;
    info!("模型加载完成");
    Ok(Yolo3::new(backend, postprocessor))
  }
}
