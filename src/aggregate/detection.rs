// 该文件是 Guancha （观察） 项目的一部分。
// src/aggregate/detection.rs - 检测统计
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

use crate::{
  aggregate::mean,
  detection::{DetectionSummary, FrameDetections},
};

/// 汇总整段视频的检测结果
///
/// `total_frames` 为抽取的帧数；`by_class` 的键顺序不固定。
pub fn summarize_detections(
  frame_detections: &[FrameDetections],
  total_frames: usize,
) -> DetectionSummary {
  let mut by_class: HashMap<String, usize> = HashMap::new();
  let mut confidence_sum = 0.0f64;
  let mut total_detections = 0usize;
  let mut frames_with_detections = 0usize;

  for frame in frame_detections {
    if !frame.detections.is_empty() {
      frames_with_detections += 1;
    }
    for detection in &frame.detections {
      *by_class.entry(detection.class_name.clone()).or_default() += 1;
      confidence_sum += detection.confidence as f64;
      total_detections += 1;
    }
  }

  DetectionSummary {
    total_detections,
    by_class,
    avg_confidence: mean(confidence_sum, total_detections),
    frames_with_detections,
    frames_without_detections: total_frames.saturating_sub(frames_with_detections),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::{BoundingBox, Detection};

  fn detection(class_name: &str, confidence: f32, frame_number: u64) -> Detection {
    Detection {
      class_name: class_name.to_string(),
      confidence,
      bbox: BoundingBox {
        x: 0,
        y: 0,
        width: 10,
        height: 10,
      },
      frame_number,
      timestamp_ms: frame_number as f64 * 200.0,
    }
  }

  fn frame(frame_number: u64, detections: Vec<Detection>) -> FrameDetections {
    FrameDetections {
      frame_number,
      timestamp_ms: frame_number as f64 * 200.0,
      detections,
    }
  }

  #[test]
  fn counts_classes_and_frames() {
    let frames = vec![
      frame(
        0,
        vec![
          detection("person", 0.9, 0),
          detection("person", 0.8, 0),
          detection("vehicle", 0.7, 0),
        ],
      ),
      frame(6, vec![]),
      frame(12, vec![detection("vehicle", 0.6, 12)]),
    ];

    let summary = summarize_detections(&frames, 3);
    assert_eq!(summary.total_detections, 4);
    assert_eq!(summary.by_class["person"], 2);
    assert_eq!(summary.by_class["vehicle"], 2);
    assert!((summary.avg_confidence - 0.75).abs() < 1e-6);
    assert_eq!(summary.frames_with_detections, 2);
    assert_eq!(summary.frames_without_detections, 1);
  }

  #[test]
  fn empty_run_has_zero_confidence() {
    let frames = vec![frame(0, vec![]), frame(6, vec![])];
    let summary = summarize_detections(&frames, 2);
    assert_eq!(summary.total_detections, 0);
    assert_eq!(summary.avg_confidence, 0.0);
    assert!(summary.by_class.is_empty());
    assert_eq!(summary.frames_with_detections, 0);
    assert_eq!(summary.frames_without_detections, 2);
  }

  #[test]
  fn frame_counts_add_up() {
    let frames: Vec<FrameDetections> = (0..10)
      .map(|n| {
        let detections = if n % 3 == 0 {
          vec![detection("person", 0.5, n)]
        } else {
          vec![]
        };
        frame(n, detections)
      })
      .collect();

    let summary = summarize_detections(&frames, frames.len());
    assert_eq!(
      summary.frames_with_detections + summary.frames_without_detections,
      10
    );
  }
}
