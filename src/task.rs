// 该文件是 Guancha （观察） 项目的一部分。
// src/task.rs - 各运行模式的处理任务
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

use std::time::Instant;

use tracing::{debug, info};

use crate::{
  aggregate::{TrajectoryAggregator, summarize_detections, summarize_trajectories},
  detection::{
    Detection, DetectionSummary, FrameDetections, FrameTracking, ObjectTrajectory,
    TrackedDetection, TrackingSummary, object_id,
  },
  frame::SampledFrame,
  input::InputError,
  model::{DetectParams, VisionModel},
  pipeline::PipelineError,
};

pub trait Task<I, M>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M) -> Result<Self::Output, Self::Error>;
}

/// 帧计数与采样帧保留，三种任务共用
#[derive(Debug, Default)]
struct FrameTally {
  retain_sample: bool,
  frames_extracted: usize,
  sample_frame: Option<SampledFrame>,
}

impl FrameTally {
  fn new(retain_sample: bool) -> Self {
    Self {
      retain_sample,
      ..Self::default()
    }
  }

  /// 只保留第一帧
  fn count(&mut self, frame: &SampledFrame) {
    self.frames_extracted += 1;
    if self.retain_sample && self.sample_frame.is_none() {
      debug!("保留采样帧: {}", frame.frame_number());
      self.sample_frame = Some(frame.clone());
    }
  }
}

/// 仅抽帧的结果
#[derive(Debug)]
pub struct ExtractReport {
  pub frames_extracted: usize,
  pub sample_frame: Option<SampledFrame>,
}

/// 检测任务的结果
#[derive(Debug)]
pub struct DetectReport {
  pub frames_extracted: usize,
  pub sample_frame: Option<SampledFrame>,
  pub frame_detections: Vec<FrameDetections>,
  pub summary: DetectionSummary,
}

/// 跟踪任务的结果
#[derive(Debug)]
pub struct TrackReport {
  pub frames_extracted: usize,
  pub sample_frame: Option<SampledFrame>,
  pub frame_trackings: Vec<FrameTracking>,
  pub trajectories: Vec<ObjectTrajectory>,
  pub summary: TrackingSummary,
}

#[derive(Debug, Clone)]
pub struct ExtractTask {
  pub retain_sample: bool,
}

impl<I: Iterator<Item = Result<SampledFrame, InputError>>> Task<I, ()> for ExtractTask {
  type Output = ExtractReport;
  type Error = PipelineError;

  fn run_task(self, input: I, _model: ()) -> Result<Self::Output, Self::Error> {
    info!("开始抽帧任务...");
    let now = Instant::now();
    let mut tally = FrameTally::new(self.retain_sample);

    for frame in input {
      let frame = frame?;
      tally.count(&frame);
    }

    info!(
      "抽帧完成, 共 {} 帧, 耗时: {:.2?}",
      tally.frames_extracted,
      now.elapsed()
    );
    Ok(ExtractReport {
      frames_extracted: tally.frames_extracted,
      sample_frame: tally.sample_frame,
    })
  }
}

#[derive(Debug, Clone)]
pub struct DetectTask {
  pub retain_sample: bool,
  pub params: DetectParams,
}

impl<'m, I, M> Task<I, &'m M> for DetectTask
where
  I: Iterator<Item = Result<SampledFrame, InputError>>,
  M: VisionModel + ?Sized,
{
  type Output = DetectReport;
  type Error = PipelineError;

  fn run_task(self, input: I, model: &'m M) -> Result<Self::Output, Self::Error> {
    info!("开始检测任务...");
    let now = Instant::now();
    let mut tally = FrameTally::new(self.retain_sample);
    let mut frame_detections = Vec::new();

    for frame in input {
      let frame = frame?;
      tally.count(&frame);

      let detections: Vec<Detection> = model
        .detect(&frame, &self.params)?
        .into_iter()
        .map(|item| Detection {
          class_name: item.class_name,
          confidence: item.score,
          bbox: item.bbox,
          frame_number: frame.frame_number(),
          timestamp_ms: frame.timestamp_ms(),
        })
        .collect();
      debug!(
        "帧 {}: {} 个检测结果",
        frame.frame_number(),
        detections.len()
      );

      frame_detections.push(FrameDetections {
        frame_number: frame.frame_number(),
        timestamp_ms: frame.timestamp_ms(),
        detections,
      });
    }

    let summary = summarize_detections(&frame_detections, tally.frames_extracted);
    info!(
      "检测完成, 共 {} 帧, {} 个目标, 耗时: {:.2?}",
      tally.frames_extracted,
      summary.total_detections,
      now.elapsed()
    );

    Ok(DetectReport {
      frames_extracted: tally.frames_extracted,
      sample_frame: tally.sample_frame,
      frame_detections,
      summary,
    })
  }
}

/// 跟踪任务，每次运行使用新的轨迹累积器
#[derive(Debug, Clone)]
pub struct TrackTask {
  pub retain_sample: bool,
  pub params: DetectParams,
}

impl<'m, I, M> Task<I, &'m mut M> for TrackTask
where
  I: Iterator<Item = Result<SampledFrame, InputError>>,
  M: VisionModel + ?Sized,
{
  type Output = TrackReport;
  type Error = PipelineError;

  fn run_task(self, input: I, model: &'m mut M) -> Result<Self::Output, Self::Error> {
    info!("开始跟踪任务...");
    let now = Instant::now();
    let mut tally = FrameTally::new(self.retain_sample);
    let mut aggregator = TrajectoryAggregator::new();
    let mut frame_trackings = Vec::new();

    for frame in input {
      let frame = frame?;
      tally.count(&frame);

      let tracked_detections: Vec<TrackedDetection> = model
        .track(&frame, &self.params)?
        .into_iter()
        .map(|track| TrackedDetection {
          track_id: track.track_id,
          object_id: object_id(&track.item.class_name, track.track_id),
          class_name: track.item.class_name,
          confidence: track.item.score,
          bbox: track.item.bbox,
          frame_number: frame.frame_number(),
          timestamp_ms: frame.timestamp_ms(),
        })
        .collect();
      debug!(
        "帧 {}: {} 个跟踪目标",
        frame.frame_number(),
        tracked_detections.len()
      );

      let tracking = FrameTracking {
        frame_number: frame.frame_number(),
        timestamp_ms: frame.timestamp_ms(),
        tracked_detections,
      };
      aggregator.observe(&tracking);
      frame_trackings.push(tracking);
    }

    let trajectories = aggregator.build_trajectories();
    let summary = summarize_trajectories(&trajectories, &frame_trackings, tally.frames_extracted);
    info!(
      "跟踪完成, 共 {} 帧, {} 个对象, 耗时: {:.2?}",
      tally.frames_extracted,
      summary.total_unique_objects,
      now.elapsed()
    );

    Ok(TrackReport {
      frames_extracted: tally.frames_extracted,
      sample_frame: tally.sample_frame,
      frame_trackings,
      trajectories,
      summary,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detection::BoundingBox,
    frame::FrameMetadata,
    model::{DetectItem, ModelError, TrackItem},
  };
  use image::RgbImage;

  fn frames(numbers: &[u64]) -> Vec<Result<SampledFrame, InputError>> {
    numbers
      .iter()
      .map(|&n| {
        Ok(SampledFrame {
          image: RgbImage::new(8, 8),
          metadata: FrameMetadata {
            frame_number: n,
            timestamp_ms: n as f64 * 100.0,
            source_fps: 10.0,
            extraction_fps: 10.0,
            width: 8,
            height: 8,
            source_path: "test".into(),
          },
        })
      })
      .collect()
  }

  fn params() -> DetectParams {
    DetectParams {
      confidence_threshold: 0.5,
      nms_threshold: 0.45,
      target_classes: vec!["person".into()],
    }
  }

  /// 偶数帧有一个人，奇数帧为空；跟踪编号固定为 1
  struct EvenFrames {
    tracked: Vec<u64>,
  }

  impl EvenFrames {
    fn items(frame: &SampledFrame) -> Vec<DetectItem> {
      if frame.frame_number() % 2 == 0 {
        vec![DetectItem {
          class_name: "person".into(),
          score: 0.8,
          bbox: BoundingBox {
            x: 1,
            y: 1,
            width: 4,
            height: 4,
          },
        }]
      } else {
        vec![]
      }
    }
  }

  impl VisionModel for EvenFrames {
    fn detect(&self, frame: &SampledFrame, _: &DetectParams) -> Result<Vec<DetectItem>, ModelError> {
      Ok(Self::items(frame))
    }

    fn track(&mut self, frame: &SampledFrame, _: &DetectParams) -> Result<Vec<TrackItem>, ModelError> {
      self.tracked.push(frame.frame_number());
      Ok(
        Self::items(frame)
          .into_iter()
          .map(|item| TrackItem { track_id: 1, item })
          .collect(),
      )
    }

    fn reset(&mut self) {
      self.tracked.clear();
    }
  }

  struct Broken;

  impl VisionModel for Broken {
    fn detect(&self, _: &SampledFrame, _: &DetectParams) -> Result<Vec<DetectItem>, ModelError> {
      Err(ModelError::Inference("加速器不可用".into()))
    }

    fn track(&mut self, _: &SampledFrame, _: &DetectParams) -> Result<Vec<TrackItem>, ModelError> {
      Err(ModelError::Inference("加速器不可用".into()))
    }

    fn reset(&mut self) {}
  }

  #[test]
  fn extract_retains_only_the_first_frame() {
    let report = ExtractTask {
      retain_sample: true,
    }
    .run_task(frames(&[0, 3, 6]).into_iter(), ())
    .unwrap();
    assert_eq!(report.frames_extracted, 3);
    assert_eq!(report.sample_frame.unwrap().frame_number(), 0);

    let report = ExtractTask {
      retain_sample: false,
    }
    .run_task(frames(&[0, 3]).into_iter(), ())
    .unwrap();
    assert!(report.sample_frame.is_none());
  }

  #[test]
  fn extract_propagates_source_errors() {
    let mut input = frames(&[0]);
    input.push(Err(InputError::read_failure("clip.gif", "truncated")));
    let result = ExtractTask {
      retain_sample: true,
    }
    .run_task(input.into_iter(), ());
    assert!(matches!(
      result,
      Err(PipelineError::Input(InputError::SourceReadFailure { .. }))
    ));
  }

  #[test]
  fn detect_records_every_frame() {
    let model = EvenFrames { tracked: vec![] };
    let report = DetectTask {
      retain_sample: true,
      params: params(),
    }
    .run_task(frames(&[0, 1, 2, 3]).into_iter(), &model)
    .unwrap();

    assert_eq!(report.frame_detections.len(), 4);
    assert_eq!(report.frame_detections[2].detections[0].frame_number, 2);
    assert_eq!(report.frame_detections[2].detections[0].timestamp_ms, 200.0);
    assert_eq!(report.summary.frames_with_detections, 2);
    assert_eq!(report.summary.frames_without_detections, 2);
  }

  #[test]
  fn track_submits_frames_in_order() {
    let mut model = EvenFrames { tracked: vec![] };
    let report = TrackTask {
      retain_sample: false,
      params: params(),
    }
    .run_task(frames(&[0, 5, 10, 15, 20]).into_iter(), &mut model)
    .unwrap();

    assert_eq!(model.tracked, vec![0, 5, 10, 15, 20]);
    assert_eq!(report.trajectories.len(), 1);
    assert_eq!(report.trajectories[0].object_id, "person_1");
    assert_eq!(report.trajectories[0].frame_numbers, vec![0, 10, 20]);
    assert_eq!(report.summary.frames_with_tracks, 3);
    assert_eq!(report.summary.frames_without_tracks, 2);
  }

  #[test]
  fn model_failure_aborts_the_run() {
    let result = DetectTask {
      retain_sample: true,
      params: params(),
    }
    .run_task(frames(&[0, 1]).into_iter(), &Broken);
    assert!(matches!(result, Err(PipelineError::VisionModel(_))));

    let result = TrackTask {
      retain_sample: true,
      params: params(),
    }
    .run_task(frames(&[0, 1]).into_iter(), &mut Broken);
    assert!(matches!(result, Err(PipelineError::VisionModel(_))));
  }
}
