// 该文件是 Guancha （观察） 项目的一部分。
// src/sampler.rs - 基于时间戳的帧抽取
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

use tracing::debug;

use crate::{
  frame::{FrameMetadata, SampledFrame, VideoMetadata, timestamp_ms},
  input::{FrameSource, InputError},
};

/// 目标帧率与原生帧率之差小于该值时逐帧输出
pub const PASS_THROUGH_EPSILON: f64 = 0.01;

/// 抽帧时钟
///
/// 维护“下一目标时间戳”，每输出一帧按固定间隔推进，
/// 而不是重置为已输出帧的时间戳，因此非整数帧率下不会累积漂移。
/// 原生帧率须为正数。
#[derive(Debug, Clone)]
pub struct SamplingClock {
  source_fps: f64,
  target_fps: f64,
  /// `None` 表示逐帧输出
  interval_ms: Option<f64>,
  next_target_ms: f64,
}

impl SamplingClock {
  /// 目标帧率会被限制在原生帧率以内
  pub fn new(source_fps: f64, requested_fps: f64) -> Self {
    let target_fps = requested_fps.min(source_fps);
    let interval_ms = if (target_fps - source_fps).abs() < PASS_THROUGH_EPSILON {
      None
    } else {
      Some(1000.0 / target_fps)
    };

    Self {
      source_fps,
      target_fps,
      interval_ms,
      next_target_ms: 0.0,
    }
  }

  pub fn source_fps(&self) -> f64 {
    self.source_fps
  }

  /// 实际生效的目标帧率
  pub fn target_fps(&self) -> f64 {
    self.target_fps
  }

  pub fn is_pass_through(&self) -> bool {
    self.interval_ms.is_none()
  }

  /// 判断该帧是否输出；输出时返回其时间戳（毫秒）
  pub fn admit(&mut self, frame_number: u64) -> Option<f64> {
    let timestamp = timestamp_ms(frame_number, self.source_fps);
    match self.interval_ms {
      None => Some(timestamp),
      Some(interval) if timestamp >= self.next_target_ms => {
        self.next_target_ms += interval;
        Some(timestamp)
      }
      Some(_) => None,
    }
  }
}

/// 抽帧器：消费帧源，按目标帧率输出采样帧
///
/// 本身不做 I/O，帧源的错误原样向下游传递。
pub struct TemporalSampler<S> {
  source: S,
  clock: SamplingClock,
  video: VideoMetadata,
}

impl<S: FrameSource> TemporalSampler<S> {
  pub fn new(source: S, requested_fps: f64) -> Self {
    let video = source.metadata().clone();
    let clock = SamplingClock::new(video.fps, requested_fps);
    debug!(
      "抽帧: 原生 {:.2} fps, 目标 {:.2} fps, 逐帧输出: {}",
      clock.source_fps(),
      clock.target_fps(),
      clock.is_pass_through()
    );

    Self {
      source,
      clock,
      video,
    }
  }

  pub fn target_fps(&self) -> f64 {
    self.clock.target_fps()
  }

  pub fn video(&self) -> &VideoMetadata {
    &self.video
  }
}

impl<S: FrameSource> Iterator for TemporalSampler<S> {
  type Item = Result<SampledFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let raw = match self.source.next()? {
        Ok(raw) => raw,
        Err(e) => return Some(Err(e)),
      };

      if let Some(timestamp_ms) = self.clock.admit(raw.index) {
        let metadata = FrameMetadata {
          frame_number: raw.index,
          timestamp_ms,
          source_fps: self.clock.source_fps(),
          extraction_fps: self.clock.target_fps(),
          width: self.video.width,
          height: self.video.height,
          source_path: self.video.path.clone(),
        };
        return Some(Ok(SampledFrame {
          image: raw.image,
          metadata,
        }));
      }
    }
  }
}
