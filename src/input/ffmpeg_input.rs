// 该文件是 Guancha （观察） 项目的一部分。
// src/input/ffmpeg_input.rs - FFmpeg 视频文件输入
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

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{Pixel, input};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoMetadata,
  input::{FrameSource, InputError, RawFrame},
};

/// `AVFormatContext::duration` 的单位（微秒）
const AV_TIME_BASE_US: f64 = 1_000_000.0;

/// 解码器取帧的结果
#[derive(Debug, PartialEq, Eq)]
enum Receive {
  Frame,
  NeedInput,
  Drained,
}

fn classify_receive(result: Result<(), ffmpeg::Error>) -> Result<Receive, ffmpeg::Error> {
  match result {
    Ok(()) => Ok(Receive::Frame),
    Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
      Ok(Receive::NeedInput)
    }
    Err(ffmpeg::Error::Eof) => Ok(Receive::Drained),
    Err(e) => Err(e),
  }
}

/// 流未记录帧数时，按容器时长与帧率估算
fn estimate_frame_count(stream_frames: i64, duration_us: i64, fps: f64) -> u64 {
  if stream_frames > 0 {
    return stream_frames as u64;
  }
  if duration_us <= 0 || fps.is_nan() || fps <= 0.0 {
    return 0;
  }
  (duration_us as f64 / AV_TIME_BASE_US * fps).round() as u64
}

/// FFmpeg 视频输入源
pub struct FfmpegInput {
  path: PathBuf,
  /// FFmpeg 输入上下文
  input_context: ffmpeg::format::context::Input,
  /// 视频流索引
  video_stream_index: usize,
  /// 视频解码器
  decoder: ffmpeg::decoder::Video,
  /// 缩放上下文
  scaler: ScalingContext,
  metadata: VideoMetadata,
  frame_index: u64,
  /// 是否已发送 EOF
  draining: bool,
  finished: bool,
}

impl FromUrlWithScheme for FfmpegInput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for FfmpegInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    FfmpegInput::open(Path::new(&crate::url_path(url)))
  }
}

impl FfmpegInput {
  /// 打开视频文件并读取元数据
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let fail = |e: ffmpeg::Error| InputError::read_failure(path, e);

    ffmpeg::init().map_err(fail)?;

    let input_context = input(path).map_err(fail)?;
    let video_stream = input_context
      .streams()
      .best(Type::Video)
      .ok_or_else(|| InputError::read_failure(path, "no video stream"))?;

    let video_stream_index = video_stream.index();
    let context_decoder =
      ffmpeg::codec::context::Context::from_parameters(video_stream.parameters()).map_err(fail)?;
    let decoder = context_decoder.decoder().video().map_err(fail)?;

    let width = decoder.width();
    let height = decoder.height();

    let rate = video_stream.avg_frame_rate();
    let fps = if rate.denominator() != 0 {
      rate.numerator() as f64 / rate.denominator() as f64
    } else {
      0.0
    };
    let total_frames = estimate_frame_count(video_stream.frames(), input_context.duration(), fps);
    let codec = decoder.id().name().to_string();

    let scaler = ScalingContext::get(
      decoder.format(),
      width,
      height,
      Pixel::RGB24,
      width,
      height,
      Flags::BILINEAR,
    )
    .map_err(fail)?;

    let metadata = VideoMetadata::new(
      path.display().to_string(),
      total_frames,
      fps,
      width,
      height,
      codec,
    );
    info!(
      "视频元数据: {} 帧, {:.2} fps, {}x{}, 编码 {}",
      metadata.total_frames, metadata.fps, width, height, metadata.codec
    );

    Ok(Self {
      path: path.to_path_buf(),
      input_context,
      video_stream_index,
      decoder,
      scaler,
      metadata,
      frame_index: 0,
      draining: false,
      finished: false,
    })
  }

  /// 解码下一帧
  fn decode_next_frame(&mut self) -> Result<Option<Video>, ffmpeg::Error> {
    loop {
      // 首先尝试从解码器获取已解码的帧
      let mut decoded = Video::empty();
      match classify_receive(self.decoder.receive_frame(&mut decoded))? {
        Receive::Frame => return Ok(Some(decoded)),
        Receive::Drained => return Ok(None),
        Receive::NeedInput if self.draining => return Ok(None),
        Receive::NeedInput => {}
      }

      // 读取下一个数据包
      let mut sent = false;
      for (stream, packet) in self.input_context.packets() {
        if stream.index() == self.video_stream_index {
          self.decoder.send_packet(&packet)?;
          sent = true;
          break;
        }
      }
      if !sent {
        self.decoder.send_eof()?;
        self.draining = true;
      }
    }
  }

  fn to_rgb_image(&mut self, decoded: &Video) -> Result<RgbImage, InputError> {
    let mut rgb_frame = Video::empty();
    self
      .scaler
      .run(decoded, &mut rgb_frame)
      .map_err(|e| InputError::read_failure(&self.path, e))?;

    let data = rgb_frame.data(0);
    let stride = rgb_frame.stride(0);
    let width = self.metadata.width as usize;
    let height = self.metadata.height as usize;

    // 处理步长对齐的数据
    let mut image_data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
      let row_start = y * stride;
      image_data.extend_from_slice(&data[row_start..row_start + width * 3]);
    }

    RgbImage::from_raw(self.metadata.width, self.metadata.height, image_data)
      .ok_or_else(|| InputError::read_failure(&self.path, "无法创建 RGB 图像"))
  }
}

impl Iterator for FfmpegInput {
  type Item = Result<RawFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let decoded = match self.decode_next_frame() {
      Ok(Some(decoded)) => decoded,
      Ok(None) => {
        self.finished = true;
        debug!("读取 {} 帧: {}", self.frame_index, self.path.display());
        return None;
      }
      Err(e) => {
        self.finished = true;
        return Some(Err(InputError::read_failure(&self.path, e)));
      }
    };

    match self.to_rgb_image(&decoded) {
      Ok(image) => {
        let frame = RawFrame {
          index: self.frame_index,
          image,
        };
        self.frame_index += 1;
        Some(Ok(frame))
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

impl FrameSource for FfmpegInput {
  fn metadata(&self) -> &VideoMetadata {
    &self.metadata
  }
}
