// 该文件是 Guancha （观察） 项目的一部分。
// src/input/gif_input.rs - 动态 GIF 输入
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

use std::{
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use image::{AnimationDecoder, DynamicImage, Frames, ImageDecoder, codecs::gif::GifDecoder};
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoMetadata,
  input::{FrameSource, InputError, RawFrame},
};

/// 帧延时为 0 的帧按 100ms 计
const GIF_DEFAULT_DELAY_MS: f64 = 100.0;
const GIF_CODEC: &str = "GIF";

pub struct GifInput {
  path: PathBuf,
  metadata: VideoMetadata,
  frames: Option<Frames<'static>>,
  frame_index: u64,
  finished: bool,
}

impl FromUrlWithScheme for GifInput {
  const SCHEME: &'static str = "gif";
}

impl FromUrl for GifInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    GifInput::open(Path::new(&crate::url_path(url)))
  }
}

fn decoder(path: &Path) -> Result<GifDecoder<BufReader<File>>, InputError> {
  let file = File::open(path).map_err(|e| InputError::read_failure(path, e))?;
  GifDecoder::new(BufReader::new(file)).map_err(|e| InputError::read_failure(path, e))
}

impl GifInput {
  /// 打开 GIF 文件。先完整解码一遍以统计帧数与平均帧延时
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let probe = decoder(path)?;
    let (width, height) = probe.dimensions();

    let mut total_frames = 0u64;
    let mut total_delay_ms = 0.0f64;
    for frame in probe.into_frames() {
      let frame = frame.map_err(|e| InputError::read_failure(path, e))?;
      let (numer, denom) = frame.delay().numer_denom_ms();
      let delay_ms = if denom > 0 {
        numer as f64 / denom as f64
      } else {
        0.0
      };
      total_delay_ms += if delay_ms > 0.0 {
        delay_ms
      } else {
        GIF_DEFAULT_DELAY_MS
      };
      total_frames += 1;
    }

    if total_frames == 0 {
      return Err(InputError::read_failure(path, "no frames in file"));
    }

    let fps = total_frames as f64 * 1000.0 / total_delay_ms;

    let metadata = VideoMetadata::new(
      path.display().to_string(),
      total_frames,
      fps,
      width,
      height,
      GIF_CODEC,
    );
    debug!(
      "GIF 元数据: {} 帧, {:.2} fps, {}x{}",
      total_frames, fps, width, height
    );

    Ok(Self {
      path: path.to_path_buf(),
      metadata,
      frames: None,
      frame_index: 0,
      finished: false,
    })
  }
}

impl Iterator for GifInput {
  type Item = Result<RawFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    if self.frames.is_none() {
      match decoder(&self.path) {
        Ok(decoder) => self.frames = Some(decoder.into_frames()),
        Err(e) => {
          self.finished = true;
          return Some(Err(e));
        }
      }
    }

    let frames = self.frames.as_mut()?;
    match frames.next() {
      Some(Ok(frame)) => {
        let image = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
        let raw = RawFrame {
          index: self.frame_index,
          image,
        };
        self.frame_index += 1;
        Some(Ok(raw))
      }
      Some(Err(e)) => {
        self.finished = true;
        Some(Err(InputError::read_failure(&self.path, e)))
      }
      None => {
        self.finished = true;
        debug!("读取 {} 帧: {}", self.frame_index, self.path.display());
        None
      }
    }
  }
}

impl FrameSource for GifInput {
  fn metadata(&self) -> &VideoMetadata {
    &self.metadata
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Delay, Frame, Rgba, RgbaImage, codecs::gif::GifEncoder};

  fn write_gif_with_delays(path: &Path, delays_ms: &[u32]) {
    let file = File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    let frames = delays_ms.iter().enumerate().map(|(i, &delay_ms)| {
      let buffer = RgbaImage::from_pixel(8, 6, Rgba([(i * 20) as u8, 0, 0, 255]));
      Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1))
    });
    encoder.encode_frames(frames).unwrap();
  }

  fn write_gif(path: &Path, frames: u32, delay_ms: u32) {
    let delays = vec![delay_ms; frames as usize];
    write_gif_with_delays(path, &delays);
  }

  #[test]
  fn zero_delay_frames_count_as_default_delay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.gif");
    write_gif_with_delays(&path, &[0, 100, 0, 100]);

    let input = GifInput::open(&path).unwrap();
    assert!((input.metadata().fps - 10.0).abs() < 1e-6);
    assert!((input.metadata().duration_seconds - 0.4).abs() < 1e-6);

    let path = dir.path().join("still.gif");
    write_gif_with_delays(&path, &[0, 0]);
    assert!((GifInput::open(&path).unwrap().metadata().fps - 10.0).abs() < 1e-6);
  }

  #[test]
  fn metadata_comes_from_frame_delays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_gif(&path, 5, 100);

    let input = GifInput::open(&path).unwrap();
    let meta = input.metadata();
    assert_eq!(meta.total_frames, 5);
    assert_eq!((meta.width, meta.height), (8, 6));
    assert!((meta.fps - 10.0).abs() < 1e-6);
    assert!((meta.duration_seconds - 0.5).abs() < 1e-6);
    assert_eq!(meta.codec, "GIF");
  }

  #[test]
  fn frames_are_numbered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_gif(&path, 4, 50);

    let indices: Vec<u64> = GifInput::open(&path)
      .unwrap()
      .map(|frame| frame.unwrap().index)
      .collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
  }
}
