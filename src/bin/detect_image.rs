// 该文件是 Yanmu （眼目） 项目的一部分。
// src/bin/detect_image.rs - 单张图像检测
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use yanmu::{
  FromUrl,
  input::InputWrapper,
  model::{PostprocessConfig, RegionOfInterest, Yolo3Builder},
  output::{Draw, OutputWrapper},
  task::{OneShotTask, Task},
};

/// Yanmu 单张图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 yolo3:///models/config.json?backend=replay:///dumps
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///data/street.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///data/street-detected.jpg
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
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

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let roi = region_of_interest(&args.roi);
  let postprocess = PostprocessConfig::default()
    .with_minimum_percentage(args.minimum_percentage)?
    .with_nms_threshold(args.nms_threshold)?
    .with_input_size(args.input_size)?
    .with_region_of_interest(roi);

  let mut draw = Draw::default()
    .with_show_names(!args.hide_names)
    .with_show_percentage(!args.hide_percentage)
    .with_region_of_interest(roi);
  if let Some(font) = &args.font {
    draw = draw.with_font_file(font)?;
  }

  let input = InputWrapper::from_url(&args.input)?;
  let model = Yolo3Builder::from_url(&args.model)?
    .postprocess(postprocess)
    .build()?;
  let output = OutputWrapper::from_url(&args.output)?.with_draw(draw);

  OneShotTask.run_task(input, model, output)?;

  Ok(())
}
