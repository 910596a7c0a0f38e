// 该文件是 Yanmu （眼目） 项目的一部分。
// src/task/observer.rs - 视频扫描回调
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

use std::collections::BTreeMap;
use std::convert::Infallible;

use image::RgbImage;

use crate::model::DetectItem;
use crate::task::{FrameDetection, FrameRecord, ScanState};

/// 执行了检测的一帧
#[derive(Debug, Clone, Copy)]
pub struct FrameReport<'a> {
  /// 从 1 开始的帧序号
  pub frame_index: u64,
  pub detection: &'a FrameDetection,
  pub counts: &'a BTreeMap<String, u64>,
  /// 开启 `return_detected_frame` 时为绘制了结果的帧
  pub frame: Option<&'a RgbImage>,
}

impl FrameReport<'_> {
  pub fn items(&self) -> &[DetectItem] {
    self.detection.items()
  }
}

/// 每秒或每分钟的窗口汇总
#[derive(Debug, Clone, Copy)]
pub struct WindowReport<'a> {
  /// 第几秒（分钟），从 1 开始
  pub index: u64,
  /// 窗口内的帧，按帧序号排列
  pub frames: &'a [FrameRecord],
  /// 各标签计数之和除以窗口帧数（取整）
  pub average_counts: &'a BTreeMap<String, u64>,
  pub frame: Option<&'a RgbImage>,
}

/// 扫描结束时的整体汇总
#[derive(Debug, Clone, Copy)]
pub struct ScanSummary<'a> {
  pub state: ScanState,
  pub frames: &'a [FrameRecord],
  /// 各标签计数之和除以总帧数
  pub average_counts: &'a BTreeMap<String, f64>,
}

/// 视频扫描过程中的回调，默认什么都不做
pub trait ScanObserver {
  type Error: std::error::Error + Send + Sync + 'static;

  fn on_frame(&mut self, _report: &FrameReport<'_>) -> Result<(), Self::Error> {
    Ok(())
  }

  fn on_second(&mut self, _report: &WindowReport<'_>) -> Result<(), Self::Error> {
    Ok(())
  }

  fn on_minute(&mut self, _report: &WindowReport<'_>) -> Result<(), Self::Error> {
    Ok(())
  }

  fn on_complete(&mut self, _summary: &ScanSummary<'_>) -> Result<(), Self::Error> {
    Ok(())
  }
}

impl<O: ScanObserver + ?Sized> ScanObserver for &mut O {
  type Error = O::Error;

  fn on_frame(&mut self, report: &FrameReport<'_>) -> Result<(), Self::Error> {
    (**self).on_frame(report)
  }

  fn on_second(&mut self, report: &WindowReport<'_>) -> Result<(), Self::Error> {
    (**self).on_second(report)
  }

  fn on_minute(&mut self, report: &WindowReport<'_>) -> Result<(), Self::Error> {
    (**self).on_minute(report)
  }

  fn on_complete(&mut self, summary: &ScanSummary<'_>) -> Result<(), Self::Error> {
    (**self).on_complete(summary)
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {
  type Error = Infallible;
}
