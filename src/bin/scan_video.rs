// 该文件是 Yanmu （眼目） 项目的一部分。
// src/bin/scan_video.rs - 视频扫描
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
use std::sync::mpsc::{Receiver, channel};
use std::{thread, time::Duration};

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use yanmu::{
  FromUrl,
  input::InputWrapper,
  model::{PostprocessConfig, RegionOfInterest, Yolo3Builder},
  output::{Draw, OutputWrapper, SummaryRecord},
  task::{NoopObserver, ScanConfig, ScanObserver, VideoScanTask},
};

/// Yanmu 视频扫描：逐帧检测并按秒/分钟/整段视频汇总
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 yolo3:///models/config.json?backend=replay:///dumps
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 folder:///data/frames?fps=30
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 folder:///data/detected?always 或 null://
  #[arg(long, value_name = "OUTPUT", default_value = "null://")]
  pub output: Url,
  /// 汇总记录，例如 jsonl:///data/summary.jsonl
  #[arg(long, value_name = "SUMMARY")]
  pub summary: Option<Url>,
  /// 最小百分比概率 (0-100)
  #[arg(long, default_value_t = 50.0)]
  pub minimum_percentage: f32,
  /// NMS 的 IoU 阈值
  #[arg(long, default_value_t = yanmu::model::DEFAULT_NMS_THRESHOLD)]
  pub nms_threshold: f32,
  /// 网络输入尺寸
  #[arg(long, default_value_t = yanmu::model::DEFAULT_INPUT_SIZE)]
  pub input_size: u32,
  /// 感兴趣区域 xmin,xmax,ymin,ymax
  #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
  pub roi: Vec<i64>,
  /// 每隔多少帧检测一次
  #[arg(long, default_value_t = 1)]
  pub frame_detection_interval: u64,
  /// 以视频秒数计的检测超时
  #[arg(long, value_name = "SECONDS")]
  pub detection_timeout: Option<u64>,
  /// 回调中附带绘制后的帧
  #[arg(long)]
  pub return_detected_frame: bool,
  /// 性能模式：不保留历史，不触发回调
  #[arg(long)]
  pub performance_mode: bool,
  /// 输出每帧进度
  #[arg(long)]
  pub log_progress: bool,
  /// 标签字体文件（TTF），不指定时只画框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 不显示标签名
  #[arg(long)]
  pub hide_names: bool,
  /// 不显示百分比
  #[arg(long)]
  pub hide_percentage: bool,
}

fn region_of_interest(roi: &[i64]) -> Option<RegionOfInterest> {
  if roi.is_empty() {
    return None;
  }
  let region = RegionOfInterest::from_slice(roi);
  if region.is_none() {
    warn!("感兴趣区域需要 4 个坐标，实际 {} 个，忽略", roi.len());
  }
  region
}

fn stop_signal() -> Result<Receiver<()>> {
  let (tx, rx) = channel();
  ctrlc::set_handler(move || {
    warn!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

fn scan<S: ScanObserver>(
  args: &Args,
  observer: S,
  input: InputWrapper,
  output: OutputWrapper,
  draw: Draw,
) -> Result<()> {
  let fps = input
    .fps()
    .ok_or_else(|| anyhow!("输入 {} 没有帧率，无法按时间汇总", args.input))?;

  let roi = region_of_interest(&args.roi);
  let postprocess = PostprocessConfig::default()
    .with_minimum_percentage(args.minimum_percentage)?
    .with_nms_threshold(args.nms_threshold)?
    .with_input_size(args.input_size)?
    .with_region_of_interest(roi);
  let model = Yolo3Builder::from_url(&args.model)?
    .postprocess(postprocess)
    .build()?;

  let config = ScanConfig::default()
    .with_frame_detection_interval(args.frame_detection_interval)
    .with_detection_timeout(args.detection_timeout)
    .with_return_detected_frame(args.return_detected_frame)
    .with_performance_mode(args.performance_mode)
    .with_log_progress(args.log_progress);

  let outcome = VideoScanTask::new(fps, config, observer)?
    .with_draw(draw)
    .with_stop_signal(stop_signal()?)
    .scan(input, model, output)?;

  info!(
    "扫描结果: {:?}，处理 {} 帧",
    outcome.state, outcome.frames_processed
  );
  Ok(())
}

fn build_draw(args: &Args) -> Result<Draw> {
  let mut draw = Draw::default()
    .with_show_names(!args.hide_names)
    .with_show_percentage(!args.hide_percentage)
    .with_region_of_interest(region_of_interest(&args.roi));
  if let Some(font) = &args.font {
    draw = draw.with_font_file(font)?;
  }
  Ok(draw)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let draw = build_draw(&args)?;
  let output = OutputWrapper::from_url(&args.output)?.with_draw(draw.clone());

  match &args.summary {
    Some(summary) => {
      info!("汇总记录: {}", summary);
      let observer = SummaryRecord::from_url(summary)?;
      scan(&args, observer, input, output, draw)
    }
    None => scan(&args, NoopObserver, input, output, draw),
  }
}
