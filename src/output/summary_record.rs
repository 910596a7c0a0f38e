// 该文件是 Yanmu （眼目） 项目的一部分。
// src/output/summary_record.rs - 扫描汇总记录
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
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectItem,
  task::{FrameReport, ScanObserver, ScanState, ScanSummary, WindowReport},
  url_path,
};

#[derive(Error, Debug)]
pub enum SummaryRecordError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
  Frame {
    index: u64,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    items: &'a [DetectItem],
    counts: &'a BTreeMap<String, u64>,
  },
  Second {
    index: u64,
    counts: &'a BTreeMap<String, u64>,
  },
  Minute {
    index: u64,
    counts: &'a BTreeMap<String, u64>,
  },
  Complete {
    state: ScanState,
    frames: usize,
    counts: &'a BTreeMap<String, f64>,
  },
}

/// 把扫描回调逐行写成 JSON（`jsonl://path`）
///
/// 秒、分钟与结束行中的 `counts` 为平均计数。
pub struct SummaryRecord<W: Write = BufWriter<File>> {
  writer: W,
}

impl FromUrlWithScheme for SummaryRecord {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for SummaryRecord {
  type Error = SummaryRecordError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SummaryRecordError::SchemeMismatch);
    }
    Self::create(url_path(url))
  }
}

impl SummaryRecord {
  pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SummaryRecordError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    info!("扫描汇总写入 {}", path.display());
    Ok(Self::new(BufWriter::new(File::create(path)?)))
  }
}

impl<W: Write> SummaryRecord<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }

  fn write_line(&mut self, line: &Line<'_>) -> Result<(), SummaryRecordError> {
    serde_json::to_writer(&mut self.writer, line)?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }
}

impl<W: Write> ScanObserver for SummaryRecord<W> {
  type Error = SummaryRecordError;

  fn on_frame(&mut self, report: &FrameReport<'_>) -> Result<(), Self::Error> {
    let reason = match report.detection {
      crate::task::FrameDetection::Failed { reason } => Some(reason.as_str()),
      _ => None,
    };
    self.write_line(&Line::Frame {
      index: report.frame_index,
      status: report.detection.status(),
      reason,
      items: report.items(),
      counts: report.counts,
    })
  }

  fn on_second(&mut self, report: &WindowReport<'_>) -> Result<(), Self::Error> {
    self.write_line(&Line::Second {
      index: report.index,
      counts: report.average_counts,
    })
  }

  fn on_minute(&mut self, report: &WindowReport<'_>) -> Result<(), Self::Error> {
    self.write_line(&Line::Minute {
      index: report.index,
      counts: report.average_counts,
    })
  }

  fn on_complete(&mut self, summary: &ScanSummary<'_>) -> Result<(), Self::Error> {
    self.write_line(&Line::Complete {
      state: summary.state,
      frames: summary.frames.len(),
      counts: summary.average_counts,
    })?;
    self.writer.flush()?;
    Ok(())
  }
}
