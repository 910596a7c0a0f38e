// 该文件是 Yanmu （眼目） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 中的文件路径（百分号解码）
///
/// `image://relative/a.png` 这类写法会把第一段解析为 host，这里拼回去，
/// 使相对路径与绝对路径都能使用。
pub fn url_path(url: &url::Url) -> std::path::PathBuf {
  let path = urlencoding::decode(url.path())
    .map(|p| p.into_owned())
    .unwrap_or_else(|_| url.path().to_string());
  match url.host_str() {
    Some(host) if !host.is_empty() => std::path::PathBuf::from(format!("{}{}", host, path)),
    _ => std::path::PathBuf::from(path),
  }
}

/// 读取 URL 查询参数
pub fn url_query(url: &url::Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_keeps_relative_and_absolute_paths() {
    let relative = url::Url::parse("image://data/cat.png").unwrap();
    assert_eq!(url_path(&relative), std::path::PathBuf::from("data/cat.png"));

    let absolute = url::Url::parse("image:///tmp/a%20b.png").unwrap();
    assert_eq!(url_path(&absolute), std::path::PathBuf::from("/tmp/a b.png"));
  }

  #[test]
  fn url_query_reads_pairs() {
    let url = url::Url::parse("folder:///frames?fps=25&always").unwrap();
    assert_eq!(url_query(&url, "fps").as_deref(), Some("25"));
    assert_eq!(url_query(&url, "always").as_deref(), Some(""));
    assert_eq!(url_query(&url, "missing"), None);
  }
}
