// 该文件是 Guancha （观察） 项目的一部分。
// src/input/synthetic_input.rs - 合成测试图案输入
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

use image::{Rgb, RgbImage};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoMetadata,
  input::{FrameSource, InputError, RawFrame},
};

const DEFAULT_FRAMES: u64 = 300;
const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const SYNTHETIC_CODEC: &str = "RAW";
const MARKER_SIZE: u32 = 32;

/// 合成输入：暗色背景上一个随帧序号水平移动的白色方块
///
/// 用法：`synthetic://?frames=300&fps=30&width=640&height=480`
#[derive(Debug, Clone)]
pub struct SyntheticInput {
  metadata: VideoMetadata,
  frame_index: u64,
}

impl FromUrlWithScheme for SyntheticInput {
  const SCHEME: &'static str = "synthetic";
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, InputError> {
  value
    .parse()
    .map_err(|_| InputError::InvalidParameter(format!("{key}={value}")))
}

impl FromUrl for SyntheticInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut frames = DEFAULT_FRAMES;
    let mut fps = DEFAULT_FPS;
    let mut width = DEFAULT_WIDTH;
    let mut height = DEFAULT_HEIGHT;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "frames" => frames = parse_param(&k, &v)?,
        "fps" => fps = parse_param(&k, &v)?,
        "width" => width = parse_param(&k, &v)?,
        "height" => height = parse_param(&k, &v)?,
        _ => return Err(InputError::InvalidParameter(k.to_string())),
      }
    }

    SyntheticInput::new(frames, fps, width, height)
  }
}

impl SyntheticInput {
  pub fn new(frames: u64, fps: f64, width: u32, height: u32) -> Result<Self, InputError> {
    if fps.is_nan() || fps <= 0.0 {
      return Err(InputError::InvalidParameter(format!("fps={fps}")));
    }
    if width == 0 || height == 0 {
      return Err(InputError::InvalidParameter(format!(
        "size={width}x{height}"
      )));
    }

    Ok(Self {
      metadata: VideoMetadata::new(
        SyntheticInput::SCHEME,
        frames,
        fps,
        width,
        height,
        SYNTHETIC_CODEC,
      ),
      frame_index: 0,
    })
  }

  fn render(&self, index: u64) -> RgbImage {
    let (width, height) = (self.metadata.width, self.metadata.height);
    let mut image = RgbImage::from_pixel(width, height, Rgb([16, 16, 16]));

    let span = width.saturating_sub(MARKER_SIZE).max(1) as u64;
    let left = (index * 4 % span) as u32;
    let top = height.saturating_sub(MARKER_SIZE) / 2;
    for y in top..(top + MARKER_SIZE).min(height) {
      for x in left..(left + MARKER_SIZE).min(width) {
        image.put_pixel(x, y, Rgb([255, 255, 255]));
      }
    }
    image
  }
}

impl Iterator for SyntheticInput {
  type Item = Result<RawFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.frame_index >= self.metadata.total_frames {
      return None;
    }

    let index = self.frame_index;
    self.frame_index += 1;
    Some(Ok(RawFrame {
      index,
      image: self.render(index),
    }))
  }
}

impl FrameSource for SyntheticInput {
  fn metadata(&self) -> &VideoMetadata {
    &self.metadata
  }
}
