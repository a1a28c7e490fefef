// 该文件是 Guancha （观察） 项目的一部分。
// src/frame.rs - 视频元数据与采样帧定义
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

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 视频元数据，打开视频时创建一次，之后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
  /// 视频路径
  pub path: String,
  /// 总帧数
  pub total_frames: u64,
  /// 原生帧率
  pub fps: f64,
  pub width: u32,
  pub height: u32,
  /// 时长（秒）
  pub duration_seconds: f64,
  /// 编码标识
  pub codec: String,
}

impl VideoMetadata {
  /// 由帧数与帧率推算时长，帧率非正时时长为 0
  pub fn new(
    path: impl Into<String>,
    total_frames: u64,
    fps: f64,
    width: u32,
    height: u32,
    codec: impl Into<String>,
  ) -> Self {
    let duration_seconds = if fps > 0.0 {
      total_frames as f64 / fps
    } else {
      0.0
    };

    Self {
      path: path.into(),
      total_frames,
      fps,
      width,
      height,
      duration_seconds,
      codec: codec.into(),
    }
  }
}

/// 采样帧元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
  /// 源视频中的帧序号（从 0 开始，采样后不重新编号）
  pub frame_number: u64,
  /// 时间戳（毫秒），`frame_number / source_fps * 1000`
  pub timestamp_ms: f64,
  pub source_fps: f64,
  pub extraction_fps: f64,
  pub width: u32,
  pub height: u32,
  pub source_path: String,
}

/// 采样帧：图像与元数据
#[derive(Debug, Clone)]
pub struct SampledFrame {
  pub image: RgbImage,
  pub metadata: FrameMetadata,
}

impl SampledFrame {
  pub fn frame_number(&self) -> u64 {
    self.metadata.frame_number
  }

  pub fn timestamp_ms(&self) -> f64 {
    self.metadata.timestamp_ms
  }
}

/// 由帧序号与原生帧率计算时间戳（毫秒）
pub fn timestamp_ms(frame_number: u64, source_fps: f64) -> f64 {
  frame_number as f64 / source_fps * 1000.0
}
