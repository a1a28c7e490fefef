// 该文件是 Guancha （观察） 项目的一部分。
// src/detection.rs - 检测与跟踪结果记录
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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 像素坐标边界框，左上角为原点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoundingBox {
  /// 由 `[x_min, y_min, x_max, y_max]` 截断为整数像素框
  pub fn from_xyxy(bbox: [f32; 4]) -> Self {
    let [x1, y1, x2, y2] = bbox;
    Self {
      x: x1 as i32,
      y: y1 as i32,
      width: (x2 - x1) as i32,
      height: (y2 - y1) as i32,
    }
  }
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
  pub frame_number: u64,
  pub timestamp_ms: f64,
}

/// 一帧内的全部检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
  pub frame_number: u64,
  pub timestamp_ms: f64,
  pub detections: Vec<Detection>,
}

impl FrameDetections {
  pub fn count(&self) -> usize {
    self.detections.len()
  }
}

/// 带持久跟踪编号的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
  pub track_id: u64,
  /// `"{class}_{track_id}"`
  pub object_id: String,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
  pub frame_number: u64,
  pub timestamp_ms: f64,
}

/// 跟踪对象标识：`"{class}_{track_id}"`
pub fn object_id(class_name: &str, track_id: u64) -> String {
  format!("{class_name}_{track_id}")
}

/// 一帧内的全部跟踪结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTracking {
  pub frame_number: u64,
  pub timestamp_ms: f64,
  pub tracked_detections: Vec<TrackedDetection>,
}

impl FrameTracking {
  pub fn count(&self) -> usize {
    self.tracked_detections.len()
  }
}

/// 单个跟踪对象在整段视频中的轨迹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTrajectory {
  pub track_id: u64,
  /// 以多数类别生成的 `"{class}_{track_id}"`
  pub object_id: String,
  /// 多数类别
  pub class_name: String,
  pub first_frame: u64,
  pub last_frame: u64,
  /// 可见帧数（观测次数，中间的丢失帧不计入）
  pub total_frames: usize,
  pub avg_confidence: f64,
  pub positions: Vec<BoundingBox>,
  pub frame_numbers: Vec<u64>,
}

/// 检测统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
  pub total_detections: usize,
  pub by_class: HashMap<String, usize>,
  pub avg_confidence: f64,
  pub frames_with_detections: usize,
  pub frames_without_detections: usize,
}

/// 跟踪统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSummary {
  pub total_unique_objects: usize,
  /// 按轨迹（而非单帧检测）计数
  pub by_class: HashMap<String, usize>,
  pub avg_track_length: f64,
  pub longest_track: usize,
  /// 各帧检测数之和，不按跟踪编号去重
  pub total_detections: usize,
  pub frames_with_tracks: usize,
  pub frames_without_tracks: usize,
}
