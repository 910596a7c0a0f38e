// 该文件是 Yanmu （眼目） 项目的一部分。
// src/task.rs - 检测任务
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

use std::sync::mpsc::Receiver;

use tracing::{error, info, warn};

use crate::{
  frame::RgbNhwcFrame,
  model::{DetectResult, Model},
  output::{Draw, Render},
};

mod aggregator;
pub use self::aggregator::{
  FrameDetection, FrameRecord, ScanConfig, ScanError, ScanOutcome, ScanState, TemporalAggregator,
};

mod observer;
pub use self::observer::{FrameReport, NoopObserver, ScanObserver, ScanSummary, WindowReport};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 对输入的第一帧做一次检测
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 逐帧扫描视频，按秒、分钟与整段视频汇总检测结果
///
/// 单帧检测失败只记录为失败帧，不中断扫描；模型报告的致命错误与输出渲染失败则终止任务，
/// 此时不触发结束回调。
pub struct VideoScanTask<S> {
  fps: u32,
  config: ScanConfig,
  observer: S,
  draw: Draw,
  stop_signal: Option<Receiver<()>>,
}

impl<S: ScanObserver> VideoScanTask<S> {
  pub fn new(fps: u32, config: ScanConfig, observer: S) -> Result<Self, ScanError> {
    if fps == 0 {
      return Err(ScanError::InvalidFps);
    }
    config.validate()?;
    Ok(Self {
      fps,
      config,
      observer,
      draw: Draw::default(),
      stop_signal: None,
    })
  }

  /// 每帧结束时检查一次，收到信号后像正常结束一样收尾
  pub fn with_stop_signal(mut self, stop_signal: Receiver<()>) -> Self {
    self.stop_signal = Some(stop_signal);
    self
  }

  /// 开启 `return_detected_frame` 时用于绘制回调帧
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn stop_requested(&self) -> bool {
    self
      .stop_signal
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }

  /// 执行扫描并返回聚合结果
  pub fn scan<I, M, O, ME, RE>(mut self, input: I, model: M, output: O) -> anyhow::Result<ScanOutcome>
  where
    ME: std::fmt::Display,
    RE: std::error::Error + Sync + Send + 'static,
    I: Iterator<Item = RgbNhwcFrame>,
    M: Model<Input = RgbNhwcFrame, Output = DetectResult, Error = ME>,
    O: Render<RgbNhwcFrame, DetectResult, Error = RE>,
  {
    info!("开始视频扫描，帧率 {} fps，配置 {:?}", self.fps, self.config);
    let mut aggregator = TemporalAggregator::new(self.fps, self.config.clone())?;
    let empty = DetectResult::default();

    for frame in input {
      let Some(index) = aggregator.begin_frame() else {
        break;
      };

      let detection = if aggregator.should_detect(index) {
        match model.infer(&frame) {
          Ok(result) => FrameDetection::Detected(result),
          Err(e) if model.is_fatal(&e) => {
            error!("第 {} 帧检测出现致命错误，终止扫描: {}", index, e);
            return Err(
              ScanError::FatalDetection {
                frame_index: index,
                reason: e.to_string(),
              }
              .into(),
            );
          }
          Err(e) => {
            warn!("第 {} 帧检测失败: {}", index, e);
            FrameDetection::Failed {
              reason: e.to_string(),
            }
          }
        }
      } else {
        FrameDetection::Skipped
      };

      let result = detection.result().unwrap_or(&empty);
      output.render_result(&frame, result)?;

      let annotated = (self.config.return_detected_frame() && !self.config.performance_mode())
        .then(|| self.draw.draw_detection(&frame, result));
      aggregator.record(detection, annotated.as_ref(), &mut self.observer)?;

      if self.stop_requested() {
        warn!("中断信号接收，在第 {} 帧结束扫描", index);
        break;
      }
    }

    let outcome = aggregator.finish(&mut self.observer)?;
    info!(
      "视频扫描结束: {:?}，处理 {} 帧",
      outcome.state, outcome.frames_processed
    );
    Ok(outcome)
  }
}

impl<
  ME: std::fmt::Display,
  RE: std::error::Error + Sync + Send + 'static,
  S: ScanObserver,
  I: Iterator<Item = RgbNhwcFrame>,
  M: Model<Input = RgbNhwcFrame, Output = DetectResult, Error = ME>,
  O: Render<RgbNhwcFrame, DetectResult, Error = RE>,
> Task<I, M, O> for VideoScanTask<S>
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    self.scan(input, model, output).map(|_| ())
  }
}
