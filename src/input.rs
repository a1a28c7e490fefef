// 该文件是 Guancha （观察） 项目的一部分。
// src/input.rs - 视频帧输入源
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, config::ExtractionConfig, frame::VideoMetadata};

mod gif_input;
pub use self::gif_input::GifInput;

mod synthetic_input;
pub use self::synthetic_input::SyntheticInput;

#[cfg(feature = "ffmpeg")]
mod ffmpeg_input;
#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg_input::FfmpegInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Video file not found: {0}")]
  SourceNotFound(String),
  #[error("Unsupported format for '{path}'. Supported: {}", supported.join(", "))]
  UnsupportedFormat {
    path: String,
    supported: Vec<String>,
  },
  #[error("Failed to read video: {path} ({reason})")]
  SourceReadFailure { path: String, reason: String },
  #[error("Invalid source parameter: {0}")]
  InvalidParameter(String),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

impl InputError {
  pub fn read_failure(path: impl AsRef<Path>, reason: impl ToString) -> Self {
    InputError::SourceReadFailure {
      path: path.as_ref().display().to_string(),
      reason: reason.to_string(),
    }
  }
}

/// 源视频中的一帧
#[derive(Debug, Clone)]
pub struct RawFrame {
  /// 帧序号（从 0 开始，严格递增）
  pub index: u64,
  /// RGB 图像数据
  pub image: RgbImage,
}

/// 帧源：顺序、只进地产生 (index, image)，关闭即 Drop
pub trait FrameSource: Iterator<Item = Result<RawFrame, InputError>> {
  /// 打开时确定的元数据
  fn metadata(&self) -> &VideoMetadata;
}

/// 校验路径存在且扩展名在允许列表中，返回规范化后的路径
pub fn validate_path(path: &Path, supported: &[String]) -> Result<PathBuf, InputError> {
  if !path.is_file() {
    return Err(InputError::SourceNotFound(path.display().to_string()));
  }

  let path = path
    .canonicalize()
    .map_err(|e| InputError::read_failure(path, e))?;

  let suffix = path
    .extension()
    .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    .unwrap_or_default();

  if !supported.iter().any(|s| s.to_lowercase() == suffix) {
    error!("不支持的视频格式: {}", path.display());
    return Err(InputError::UnsupportedFormat {
      path: path.display().to_string(),
      supported: supported.to_vec(),
    });
  }

  Ok(path)
}

pub enum InputWrapper {
  Gif(GifInput),
  Synthetic(SyntheticInput),
  #[cfg(feature = "ffmpeg")]
  Ffmpeg(FfmpegInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      GifInput::SCHEME => Ok(InputWrapper::Gif(GifInput::from_url(url)?)),
      SyntheticInput::SCHEME => Ok(InputWrapper::Synthetic(SyntheticInput::from_url(url)?)),
      #[cfg(feature = "ffmpeg")]
      FfmpegInput::SCHEME => Ok(InputWrapper::Ffmpeg(FfmpegInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  /// 打开输入源：带方案的 URL 按方案分发，普通路径先校验再按扩展名分发
  pub fn open(source: &str, supported: &[String]) -> Result<Self, InputError> {
    if let Ok(url) = Url::parse(source)
      && url.scheme().len() > 1
    {
      if url.scheme() != SyntheticInput::SCHEME {
        validate_path(Path::new(&crate::url_path(&url)), supported)?;
      }
      let input = Self::from_url(&url)?;
      info!("已打开输入源: {}", url);
      return Ok(input);
    }

    let path = validate_path(Path::new(source), supported)?;
    let input = match path.extension().and_then(|ext| ext.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("gif") => InputWrapper::Gif(GifInput::open(&path)?),
      #[cfg(feature = "ffmpeg")]
      _ => InputWrapper::Ffmpeg(FfmpegInput::open(&path)?),
      #[cfg(not(feature = "ffmpeg"))]
      _ => {
        return Err(InputError::read_failure(
          &path,
          "no container decoder compiled in (enable the `ffmpeg` feature)",
        ));
      }
    };
    info!("已打开视频: {}", path.display());
    Ok(input)
  }
}

/// 按抽帧配置中的格式列表打开输入源
pub fn open_source(source: &str, config: &ExtractionConfig) -> Result<InputWrapper, InputError> {
  InputWrapper::open(source, &config.supported_formats)
}

impl Iterator for InputWrapper {
  type Item = Result<RawFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::Gif(input) => input.next(),
      InputWrapper::Synthetic(input) => input.next(),
      #[cfg(feature = "ffmpeg")]
      InputWrapper::Ffmpeg(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn metadata(&self) -> &VideoMetadata {
    match self {
      InputWrapper::Gif(input) => input.metadata(),
      InputWrapper::Synthetic(input) => input.metadata(),
      #[cfg(feature = "ffmpeg")]
      InputWrapper::Ffmpeg(input) => input.metadata(),
    }
  }
}
