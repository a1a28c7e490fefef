// 该文件是 Guancha （观察） 项目的一部分。
// src/aggregate/trajectory.rs - 跟踪轨迹累积与统计
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

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::{
  aggregate::mean,
  detection::{BoundingBox, FrameTracking, ObjectTrajectory, TrackingSummary, object_id},
};

#[derive(Debug, Clone)]
struct Observation {
  frame_number: u64,
  class_name: String,
  confidence: f32,
  bbox: BoundingBox,
}

/// 轨迹累积器
///
/// 按帧顺序调用 `observe`，处理完整段视频后再调用 `build_trajectories`
/// 或 `summarize`。每段视频应使用新的累积器，复用时必须先 `reset`。
#[derive(Debug, Default)]
pub struct TrajectoryAggregator {
  tracks: BTreeMap<u64, Vec<Observation>>,
}

/// 多数类别；票数相同时取最先出现的类别
fn majority_class(observations: &[Observation]) -> String {
  let mut votes: Vec<(&str, usize)> = Vec::new();
  for observation in observations {
    match votes
      .iter_mut()
      .find(|(class_name, _)| *class_name == observation.class_name.as_str())
    {
      Some((_, count)) => *count += 1,
      None => votes.push((observation.class_name.as_str(), 1)),
    }
  }

  let mut best: Option<(&str, usize)> = None;
  for (class_name, count) in votes {
    if best.is_none_or(|(_, best_count)| count > best_count) {
      best = Some((class_name, count));
    }
  }
  best.map(|(class_name, _)| class_name.to_string()).unwrap_or_default()
}

impl TrajectoryAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  /// 累积一帧的跟踪结果
  ///
  /// 同一编号在同一帧或更早的帧再次出现时忽略该观测，保证帧序号严格递增。
  pub fn observe(&mut self, frame: &FrameTracking) {
    for tracked in &frame.tracked_detections {
      let observations = self.tracks.entry(tracked.track_id).or_default();
      if let Some(last) = observations.last()
        && last.frame_number >= tracked.frame_number
      {
        warn!(
          "忽略乱序观测: 编号 {}, 帧 {} (上一帧 {})",
          tracked.track_id, tracked.frame_number, last.frame_number
        );
        continue;
      }

      observations.push(Observation {
        frame_number: tracked.frame_number,
        class_name: tracked.class_name.clone(),
        confidence: tracked.confidence,
        bbox: tracked.bbox,
      });
    }
  }

  /// 当前累积的跟踪编号数
  pub fn track_count(&self) -> usize {
    self.tracks.len()
  }

  /// 每个跟踪编号生成一条轨迹，按编号升序
  pub fn build_trajectories(&self) -> Vec<ObjectTrajectory> {
    self
      .tracks
      .iter()
      .filter(|(_, observations)| !observations.is_empty())
      .map(|(&track_id, observations)| {
        let class_name = majority_class(observations);
        let frame_numbers: Vec<u64> = observations.iter().map(|o| o.frame_number).collect();
        let confidence_sum: f64 = observations.iter().map(|o| o.confidence as f64).sum();

        ObjectTrajectory {
          track_id,
          object_id: object_id(&class_name, track_id),
          class_name,
          first_frame: frame_numbers.iter().copied().min().unwrap_or_default(),
          last_frame: frame_numbers.iter().copied().max().unwrap_or_default(),
          total_frames: observations.len(),
          avg_confidence: mean(confidence_sum, observations.len()),
          positions: observations.iter().map(|o| o.bbox).collect(),
          frame_numbers,
        }
      })
      .collect()
  }

  /// 汇总跟踪统计，内部会重新生成轨迹
  pub fn summarize(&self, frame_trackings: &[FrameTracking], total_frames: usize) -> TrackingSummary {
    let trajectories = self.build_trajectories();
    summarize_trajectories(&trajectories, frame_trackings, total_frames)
  }

  /// 清空累积状态
  pub fn reset(&mut self) {
    self.tracks.clear();
  }
}

pub(crate) fn summarize_trajectories(
  trajectories: &[ObjectTrajectory],
  frame_trackings: &[FrameTracking],
  total_frames: usize,
) -> TrackingSummary {
  let mut by_class: HashMap<String, usize> = HashMap::new();
  for trajectory in trajectories {
    *by_class.entry(trajectory.class_name.clone()).or_default() += 1;
  }

  let total_detections = frame_trackings.iter().map(FrameTracking::count).sum();
  let frames_with_tracks = frame_trackings.iter().filter(|f| f.count() > 0).count();
  let track_length_sum: usize = trajectories.iter().map(|t| t.total_frames).sum();

  TrackingSummary {
    total_unique_objects: trajectories.len(),
    by_class,
    avg_track_length: mean(track_length_sum as f64, trajectories.len()),
    longest_track: trajectories
      .iter()
      .map(|t| t.total_frames)
      .max()
      .unwrap_or_default(),
    total_detections,
    frames_with_tracks,
    frames_without_tracks: total_frames.saturating_sub(frames_with_tracks),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::TrackedDetection;

  fn tracked(track_id: u64, class_name: &str, confidence: f32, frame_number: u64) -> TrackedDetection {
    TrackedDetection {
      track_id,
      object_id: object_id(class_name, track_id),
      class_name: class_name.to_string(),
      confidence,
      bbox: BoundingBox {
        x: frame_number as i32 * 5,
        y: 10,
        width: 20,
        height: 40,
      },
      frame_number,
      timestamp_ms: frame_number as f64 * 100.0,
    }
  }

  fn frame(frame_number: u64, tracked_detections: Vec<TrackedDetection>) -> FrameTracking {
    FrameTracking {
      frame_number,
      timestamp_ms: frame_number as f64 * 100.0,
      tracked_detections,
    }
  }

  /// 三个固定编号的目标连续出现 5 帧
  fn three_objects(frames: u64) -> Vec<FrameTracking> {
    (0..frames)
      .map(|n| {
        frame(
          n,
          vec![
            tracked(1, "person", 0.9, n),
            tracked(2, "person", 0.8, n),
            tracked(3, "vehicle", 0.7, n),
          ],
        )
      })
      .collect()
  }

  #[test]
  fn three_identities_over_five_frames() {
    let frames = three_objects(5);
    let mut aggregator = TrajectoryAggregator::new();
    frames.iter().for_each(|f| aggregator.observe(f));

    let trajectories = aggregator.build_trajectories();
    assert_eq!(trajectories.len(), 3);
    for trajectory in &trajectories {
      assert_eq!(trajectory.total_frames, 5);
      assert_eq!(trajectory.first_frame, 0);
      assert_eq!(trajectory.last_frame, 4);
      assert_eq!(trajectory.positions.len(), 5);
      assert_eq!(trajectory.frame_numbers, vec![0, 1, 2, 3, 4]);
    }
    let ids: Vec<&str> = trajectories.iter().map(|t| t.object_id.as_str()).collect();
    assert_eq!(ids, vec!["person_1", "person_2", "vehicle_3"]);
  }

  #[test]
  fn summary_counts_trajectories_per_class() {
    let mut frames = three_objects(5);
    frames.push(frame(5, vec![]));
    let mut aggregator = TrajectoryAggregator::new();
    frames.iter().for_each(|f| aggregator.observe(f));

    let summary = aggregator.summarize(&frames, frames.len());
    assert_eq!(summary.total_unique_objects, 3);
    assert_eq!(summary.by_class["person"], 2);
    assert_eq!(summary.by_class["vehicle"], 1);
    assert_eq!(summary.total_detections, 15);
    assert_eq!(summary.avg_track_length, 5.0);
    assert_eq!(summary.longest_track, 5);
    assert_eq!(summary.frames_with_tracks, 5);
    assert_eq!(summary.frames_without_tracks, 1);
  }

  #[test]
  fn gaps_are_kept_not_interpolated() {
    let frames = vec![
      frame(0, vec![tracked(7, "person", 0.5, 0)]),
      frame(10, vec![]),
      frame(20, vec![tracked(7, "person", 0.7, 20)]),
    ];
    let mut aggregator = TrajectoryAggregator::new();
    frames.iter().for_each(|f| aggregator.observe(f));

    let trajectory = &aggregator.build_trajectories()[0];
    assert_eq!(trajectory.first_frame, 0);
    assert_eq!(trajectory.last_frame, 20);
    assert_eq!(trajectory.total_frames, 2);
    assert_eq!(trajectory.frame_numbers, vec![0, 20]);
    assert!((trajectory.avg_confidence - 0.6).abs() < 1e-6);
  }

  #[test]
  fn majority_class_wins() {
    let frames = vec![
      frame(0, vec![tracked(4, "vehicle", 0.5, 0)]),
      frame(1, vec![tracked(4, "person", 0.5, 1)]),
      frame(2, vec![tracked(4, "person", 0.5, 2)]),
    ];
    let mut aggregator = TrajectoryAggregator::new();
    frames.iter().for_each(|f| aggregator.observe(f));

    let trajectory = &aggregator.build_trajectories()[0];
    assert_eq!(trajectory.class_name, "person");
    assert_eq!(trajectory.object_id, "person_4");
  }

  #[test]
  fn majority_tie_goes_to_first_seen() {
    let frames = vec![
      frame(0, vec![tracked(4, "package", 0.5, 0)]),
      frame(1, vec![tracked(4, "weapon", 0.5, 1)]),
      frame(2, vec![tracked(4, "weapon", 0.5, 2)]),
      frame(3, vec![tracked(4, "package", 0.5, 3)]),
    ];
    let mut aggregator = TrajectoryAggregator::new();
    frames.iter().for_each(|f| aggregator.observe(f));

    assert_eq!(aggregator.build_trajectories()[0].class_name, "package");
  }

  #[test]
  fn repeated_identity_in_frame_is_ignored() {
    let frames = vec![frame(
      0,
      vec![tracked(1, "person", 0.9, 0), tracked(1, "person", 0.1, 0)],
    )];
    let mut aggregator = TrajectoryAggregator::new();
    frames.iter().for_each(|f| aggregator.observe(f));

    let trajectory = &aggregator.build_trajectories()[0];
    assert_eq!(trajectory.total_frames, 1);
    assert_eq!(trajectory.frame_numbers, vec![0]);
  }

  #[test]
  fn empty_run_has_zero_track_length() {
    let frames = vec![frame(0, vec![]), frame(1, vec![])];
    let aggregator = TrajectoryAggregator::new();
    let summary = aggregator.summarize(&frames, 2);
    assert_eq!(summary.total_unique_objects, 0);
    assert_eq!(summary.avg_track_length, 0.0);
    assert_eq!(summary.longest_track, 0);
    assert_eq!(summary.frames_without_tracks, 2);
  }

  #[test]
  fn reset_discards_everything() {
    let mut aggregator = TrajectoryAggregator::new();
    three_objects(3).iter().for_each(|f| aggregator.observe(f));
    assert_eq!(aggregator.track_count(), 3);

    aggregator.reset();
    assert!(aggregator.build_trajectories().is_empty());
    assert_eq!(aggregator.track_count(), 0);
  }
}
