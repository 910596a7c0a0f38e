// 该文件是 Yanmu （眼目） 项目的一部分。
// src/task/aggregator.rs - 视频检测结果的时间聚合
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

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{DetectItem, DetectResult};
use crate::task::observer::{FrameReport, ScanObserver, ScanSummary, WindowReport};

const SECONDS_PER_MINUTE: u64 = 60;

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("帧率必须大于 0")]
  InvalidFps,
  #[error("检测间隔必须大于 0")]
  ZeroInterval,
  #[error("检测超时必须大于 0 秒")]
  ZeroTimeout,
  #[error("没有待记录的帧，需要先调用 begin_frame")]
  NoPendingFrame,
  #[error("回调错误: {0}")]
  Observer(Box<dyn std::error::Error + Send + Sync>),
  #[error("第 {frame_index} 帧检测出现不可恢复的错误: {reason}")]
  FatalDetection { frame_index: u64, reason: String },
}

fn observer_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ScanError {
  ScanError::Observer(Box::new(e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
  Scanning,
  Complete,
  TimedOut,
}

/// 一帧的检测情况；检测失败不会中断扫描，只记录原因
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDetection {
  Detected(DetectResult),
  Skipped,
  Failed { reason: String },
}

impl FrameDetection {
  pub fn items(&self) -> &[DetectItem] {
    match self {
      FrameDetection::Detected(result) => &result.items,
      FrameDetection::Skipped | FrameDetection::Failed { .. } => &[],
    }
  }

  pub fn result(&self) -> Option<&DetectResult> {
    match self {
      FrameDetection::Detected(result) => Some(result),
      _ => None,
    }
  }

  pub fn was_attempted(&self) -> bool {
    !matches!(self, FrameDetection::Skipped)
  }

  pub fn status(&self) -> &'static str {
    match self {
      FrameDetection::Detected(_) => "detected",
      FrameDetection::Skipped => "skipped",
      FrameDetection::Failed { .. } => "failed",
    }
  }

  fn counts(&self) -> BTreeMap<String, u64> {
    self.result().map(DetectResult::counts).unwrap_or_default()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
  pub frame_index: u64,
  pub detection: FrameDetection,
  pub counts: BTreeMap<String, u64>,
}

/// 视频扫描参数
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
  frame_detection_interval: u64,
  detection_timeout: Option<u64>,
  return_detected_frame: bool,
  performance_mode: bool,
  log_progress: bool,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      frame_detection_interval: 1,
      detection_timeout: None,
      return_detected_frame: false,
      performance_mode: false,
      log_progress: false,
    }
  }
}

impl ScanConfig {
  /// 第 1 帧以及序号为该值整数倍的帧执行检测
  pub fn with_frame_detection_interval(mut self, interval: u64) -> Self {
    self.frame_detection_interval = interval;
    self
  }

  /// 以视频秒数计的超时
  pub fn with_detection_timeout(mut self, timeout: Option<u64>) -> Self {
    self.detection_timeout = timeout;
    self
  }

  pub fn with_return_detected_frame(mut self, return_detected_frame: bool) -> Self {
    self.return_detected_frame = return_detected_frame;
    self
  }

  /// 只按间隔检测并输出，不保留历史，不触发任何回调
  pub fn with_performance_mode(mut self, performance_mode: bool) -> Self {
    self.performance_mode = performance_mode;
    self
  }

  pub fn with_log_progress(mut self, log_progress: bool) -> Self {
    self.log_progress = log_progress;
    self
  }

  pub fn frame_detection_interval(&self) -> u64 {
    self.frame_detection_interval
  }

  pub fn detection_timeout(&self) -> Option<u64> {
    self.detection_timeout
  }

  pub fn return_detected_frame(&self) -> bool {
    self.return_detected_frame
  }

  pub fn performance_mode(&self) -> bool {
    self.performance_mode
  }

  pub fn log_progress(&self) -> bool {
    self.log_progress
  }

  pub fn validate(&self) -> Result<(), ScanError> {
    if self.frame_detection_interval == 0 {
      return Err(ScanError::ZeroInterval);
    }
    if self.detection_timeout == Some(0) {
      return Err(ScanError::ZeroTimeout);
    }
    Ok(())
  }
}

/// 扫描结束后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
  pub state: ScanState,
  /// 实际处理（检测或跳过）的帧数
  pub frames_processed: u64,
  /// 性能模式下为空
  pub frames: Vec<FrameRecord>,
}

fn window_average(frames: &[FrameRecord], window: u64) -> BTreeMap<String, u64> {
  let mut sums: BTreeMap<String, u64> = BTreeMap::new();
  for record in frames {
    for (label, count) in &record.counts {
      *sums.entry(label.clone()).or_insert(0) += count;
    }
  }
  sums.values_mut().for_each(|sum| *sum /= window);
  sums
}

fn scan_average(frames: &[FrameRecord]) -> BTreeMap<String, f64> {
  let mut sums: BTreeMap<String, f64> = BTreeMap::new();
  for record in frames {
    for (label, count) in &record.counts {
      *sums.entry(label.clone()).or_insert(0.0) += *count as f64;
    }
  }
  let total = frames.len() as f64;
  sums.values_mut().for_each(|sum| *sum /= total);
  sums
}

/// 单次视频扫描的状态机：`Scanning → Complete | TimedOut`
///
/// 每帧先调用 [`begin_frame`](Self::begin_frame) 取得帧序号，
/// 再用 [`record`](Self::record) 记录检测情况并触发回调，
/// 最后 [`finish`](Self::finish) 触发整体汇总。历史只追加不删除。
#[derive(Debug)]
pub struct TemporalAggregator {
  fps: u64,
  config: ScanConfig,
  history: Vec<FrameRecord>,
  frame_index: u64,
  frames_processed: u64,
  elapsed_seconds: u64,
  pending: bool,
  state: ScanState,
}

impl TemporalAggregator {
  pub fn new(fps: u32, config: ScanConfig) -> Result<Self, ScanError> {
    if fps == 0 {
      return Err(ScanError::InvalidFps);
    }
    config.validate()?;

    Ok(Self {
      fps: fps as u64,
      config,
      history: Vec::new(),
      frame_index: 0,
      frames_processed: 0,
      elapsed_seconds: 0,
      pending: false,
      state: ScanState::Scanning,
    })
  }

  pub fn state(&self) -> ScanState {
    self.state
  }

  pub fn config(&self) -> &ScanConfig {
    &self.config
  }

  pub fn history(&self) -> &[FrameRecord] {
    &self.history
  }

  /// 进入下一帧并返回其序号；超时或已结束时返回 None，该帧不再处理
  pub fn begin_frame(&mut self) -> Option<u64> {
    if self.state != ScanState::Scanning {
      return None;
    }

    let index = self.frame_index + 1;
    if !self.config.performance_mode
      && let Some(timeout) = self.config.detection_timeout
    {
      if index % self.fps == 0 {
        self.elapsed_seconds += 1;
      }
      if self.elapsed_seconds >= timeout {
        warn!("达到检测超时 {} 秒，在第 {} 帧停止扫描", timeout, index);
        self.state = ScanState::TimedOut;
        return None;
      }
    }

    self.frame_index = index;
    self.pending = true;
    Some(index)
  }

  pub fn should_detect(&self, frame_index: u64) -> bool {
    frame_index == 1 || frame_index % self.config.frame_detection_interval == 0
  }

  /// 记录当前帧，并按窗口边界触发回调
  pub fn record<O: ScanObserver>(
    &mut self,
    detection: FrameDetection,
    frame: Option<&RgbImage>,
    observer: &mut O,
  ) -> Result<(), ScanError> {
    if !self.pending {
      return Err(ScanError::NoPendingFrame);
    }
    self.pending = false;
    self.frames_processed += 1;

    let index = self.frame_index;
    if self.config.log_progress && detection.was_attempted() {
      info!("已处理第 {} 帧", index);
    }
    if self.config.performance_mode {
      return Ok(());
    }

    let counts = detection.counts();
    self.history.push(FrameRecord {
      frame_index: index,
      detection,
      counts,
    });
    let Some(current) = self.history.last() else {
      return Ok(());
    };

    if current.detection.was_attempted() {
      observer
        .on_frame(&FrameReport {
          frame_index: index,
          detection: &current.detection,
          counts: &current.counts,
          frame,
        })
        .map_err(observer_error)?;
    }

    if index != 1 && index % self.fps == 0 {
      let frames = &self.history[self.history.len().saturating_sub(self.fps as usize)..];
      let average_counts = window_average(frames, self.fps);
      debug!("第 {} 秒平均计数: {:?}", index / self.fps, average_counts);
      observer
        .on_second(&WindowReport {
          index: index / self.fps,
          frames,
          average_counts: &average_counts,
          frame,
        })
        .map_err(observer_error)?;
    }

    let minute = self.fps * SECONDS_PER_MINUTE;
    if index % minute == 0 {
      let frames = &self.history[self.history.len().saturating_sub(minute as usize)..];
      let average_counts = window_average(frames, minute);
      debug!("第 {} 分钟平均计数: {:?}", index / minute, average_counts);
      observer
        .on_minute(&WindowReport {
          index: index / minute,
          frames,
          average_counts: &average_counts,
          frame,
        })
        .map_err(observer_error)?;
    }

    Ok(())
  }

  /// 结束扫描并触发整体汇总（性能模式下不触发）
  pub fn finish<O: ScanObserver>(mut self, observer: &mut O) -> Result<ScanOutcome, ScanError> {
    if self.state == ScanState::Scanning {
      self.state = ScanState::Complete;
    }

    if !self.config.performance_mode {
      let average_counts = scan_average(&self.history);
      info!(
        "扫描结束（{:?}），共 {} 帧，平均计数: {:?}",
        self.state,
        self.history.len(),
        average_counts
      );
      observer
        .on_complete(&ScanSummary {
          state: self.state,
          frames: &self.history,
          average_counts: &average_counts,
        })
        .map_err(observer_error)?;
    }

    Ok(ScanOutcome {
      state: self.state,
      frames_processed: self.frames_processed,
      frames: self.history,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;
  use std::convert::Infallible;

  #[derive(Default)]
  struct Events {
    frames: Vec<u64>,
    seconds: Vec<(u64, usize, BTreeMap<String, u64>)>,
    minutes: Vec<(u64, usize)>,
    completes: Vec<(ScanState, usize, BTreeMap<String, f64>)>,
  }

  impl ScanObserver for Events {
    type Error = Infallible;

    fn on_frame(&mut self, report: &FrameReport<'_>) -> Result<(), Infallible> {
      self.frames.push(report.frame_index);
      Ok(())
    }

    fn on_second(&mut self, report: &WindowReport<'_>) -> Result<(), Infallible> {
      self
        .seconds
        .push((report.index, report.frames.len(), report.average_counts.clone()));
      Ok(())
    }

    fn on_minute(&mut self, report: &WindowReport<'_>) -> Result<(), Infallible> {
      self.minutes.push((report.index, report.frames.len()));
      Ok(())
    }

    fn on_complete(&mut self, summary: &ScanSummary<'_>) -> Result<(), Infallible> {
      self.completes.push((
        summary.state,
        summary.frames.len(),
        summary.average_counts.clone(),
      ));
      Ok(())
    }
  }

  fn cars(n: usize) -> FrameDetection {
    let items = (0..n)
      .map(|_| DetectItem {
        class_id: 0,
        label: "car".to_string(),
        score: 90.0,
        bbox: [0, 0, 10, 10],
      })
      .collect();
    FrameDetection::Detected(DetectResult::new(items))
  }

  /// 模拟扫描循环：`frames` 帧，检测结果由 `detect` 给出
  fn scan(
    fps: u32,
    config: ScanConfig,
    frames: u64,
    detect: impl Fn(u64) -> FrameDetection,
  ) -> (ScanOutcome, Events) {
    let mut events = Events::default();
    let mut aggregator = TemporalAggregator::new(fps, config).unwrap();
    for _ in 0..frames {
      let Some(index) = aggregator.begin_frame() else {
        break;
      };
      let detection = if aggregator.should_detect(index) {
        detect(index)
      } else {
        FrameDetection::Skipped
      };
      aggregator.record(detection, None, &mut events).unwrap();
    }
    let outcome = aggregator.finish(&mut events).unwrap();
    (outcome, events)
  }

  #[test]
  fn seconds_fire_on_fps_multiples_and_complete_once() {
    let (outcome, events) = scan(30, ScanConfig::default(), 90, |_| cars(2));
    assert_eq!(outcome.state, ScanState::Complete);
    assert_eq!(outcome.frames.len(), 90);

    let seconds: Vec<u64> = events.seconds.iter().map(|s| s.0).collect();
    assert_eq!(seconds, vec![1, 2, 3]);
    assert!(events.seconds.iter().all(|s| s.1 == 30));
    assert_eq!(events.seconds[0].2.get("car"), Some(&2));

    assert_eq!(events.frames.len(), 90);
    assert!(events.minutes.is_empty());
    assert_eq!(events.completes.len(), 1);
    let (state, frames, average) = &events.completes[0];
    assert_eq!((*state, *frames), (ScanState::Complete, 90));
    assert_eq!(average.get("car"), Some(&2.0));
  }

  #[test]
  fn window_averages_truncate_and_divide_by_window_size() {
    // 每 3 帧中只有 2 帧有车：秒平均 2/3 取整为 0，整体平均 2/3
    let (_, events) = scan(3, ScanConfig::default(), 6, |i| cars(usize::from(i % 3 != 0)));
    assert_eq!(events.seconds.len(), 2);
    assert_eq!(events.seconds[0].2.get("car"), Some(&0));
    let average = events.completes[0].2.get("car").copied().unwrap();
    assert!((average - 2.0 / 3.0).abs() < 1e-9);
  }

  #[test]
  fn first_frame_never_fires_a_second_window() {
    let (_, events) = scan(1, ScanConfig::default(), 3, |_| cars(1));
    let seconds: Vec<u64> = events.seconds.iter().map(|s| s.0).collect();
    assert_eq!(seconds, vec![2, 3]);
  }

  #[test]
  fn minutes_fire_on_sixty_second_multiples() {
    let (_, events) = scan(2, ScanConfig::default(), 250, |_| cars(1));
    assert_eq!(events.minutes, vec![(1, 120), (2, 120)]);
    assert_eq!(events.seconds.len(), 125);
  }

  #[test]
  fn detection_runs_on_first_frame_and_interval_multiples() {
    let config = ScanConfig::default().with_frame_detection_interval(5);
    let (outcome, events) = scan(30, config, 12, |_| cars(1));
    assert_eq!(events.frames, vec![1, 5, 10]);
    assert_eq!(outcome.frames.len(), 12);
    assert_eq!(outcome.frames[1].detection, FrameDetection::Skipped);
    assert!(outcome.frames[1].counts.is_empty());
  }

  #[test]
  fn failed_frames_are_recorded_and_reported() {
    let (outcome, events) = scan(30, ScanConfig::default(), 3, |i| {
      if i == 2 {
        FrameDetection::Failed {
          reason: "backend exploded".to_string(),
        }
      } else {
        cars(1)
      }
    });
    assert_eq!(events.frames, vec![1, 2, 3]);
    assert_eq!(outcome.frames[1].detection.status(), "failed");
    assert!(outcome.frames[1].detection.items().is_empty());
    assert!(outcome.frames[1].counts.is_empty());
  }

  #[test]
  fn timeout_stops_before_the_boundary_frame() {
    let config = ScanConfig::default().with_detection_timeout(Some(2));
    let (outcome, events) = scan(10, config, 100, |_| cars(1));
    assert_eq!(outcome.state, ScanState::TimedOut);
    assert_eq!(outcome.frames.len(), 19);
    assert_eq!(events.seconds.len(), 1);
    assert_eq!(events.completes.len(), 1);
    assert_eq!(events.completes[0].0, ScanState::TimedOut);
    assert_eq!(events.completes[0].1, 19);
  }

  #[test]
  fn performance_mode_keeps_no_history_and_fires_nothing() {
    let config = ScanConfig::default()
      .with_performance_mode(true)
      .with_detection_timeout(Some(1))
      .with_frame_detection_interval(2);
    let (outcome, events) = scan(5, config, 40, |_| cars(1));
    assert_eq!(outcome.state, ScanState::Complete);
    assert_eq!(outcome.frames_processed, 40);
    assert!(outcome.frames.is_empty());
    assert!(events.frames.is_empty() && events.seconds.is_empty());
    assert!(events.completes.is_empty());
  }

  #[test]
  fn empty_scan_completes_with_empty_average() {
    let (outcome, events) = scan(30, ScanConfig::default(), 0, |_| cars(1));
    assert_eq!(outcome.state, ScanState::Complete);
    assert!(events.completes[0].2.is_empty());
  }

  #[test]
  fn invalid_parameters_are_rejected() {
    assert!(matches!(
      TemporalAggregator::new(0, ScanConfig::default()),
      Err(ScanError::InvalidFps)
    ));
    assert!(matches!(
      TemporalAggregator::new(30, ScanConfig::default().with_frame_detection_interval(0)),
      Err(ScanError::ZeroInterval)
    ));
    assert!(matches!(
      TemporalAggregator::new(30, ScanConfig::default().with_detection_timeout(Some(0))),
      Err(ScanError::ZeroTimeout)
    ));
  }

  #[test]
  fn record_requires_a_pending_frame() {
    let mut aggregator = TemporalAggregator::new(30, ScanConfig::default()).unwrap();
    let mut events = Events::default();
    assert!(matches!(
      aggregator.record(cars(1), None, &mut events),
      Err(ScanError::NoPendingFrame)
    ));
  }
}
