// 该文件是 Guancha （观察） 项目的一部分。
// src/pipeline.rs - 视频处理流水线
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

use std::{fmt, path::PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::Config,
  detection::{DetectionSummary, TrackingSummary},
  frame::{SampledFrame, VideoMetadata},
  input::{FrameSource, InputError, open_source},
  model::{ModelError, VisionModel},
  output::{Annotation, ArtifactWriter, Draw, OutputError, Render, video_stem},
  sampler::TemporalSampler,
  task::{DetectTask, ExtractTask, Task, TrackTask},
};

/// 运行模式，每次运行开始前确定，运行中不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
  ExtractOnly,
  Detect,
  Track,
}

impl fmt::Display for PipelineMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineMode::ExtractOnly => "extract_only",
      PipelineMode::Detect => "detect",
      PipelineMode::Track => "track",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error(transparent)]
  Input(#[from] InputError),
  #[error("Vision model failure: {0}")]
  VisionModel(#[from] ModelError),
  #[error(transparent)]
  Output(#[from] OutputError),
  #[error("运行模式 {0} 需要视觉模型, 但未提供")]
  ModelMissing(PipelineMode),
}

/// 三种模式共有的结果字段
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
  pub video_info: VideoMetadata,
  pub frames_extracted: usize,
  pub extraction_fps: f64,
  pub sample_frame_path: Option<PathBuf>,
  /// RFC 3339 时间
  pub processed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
  #[serde(flatten)]
  pub extraction: ExtractionResult,
  pub detection_summary: DetectionSummary,
  pub detections_json_path: Option<PathBuf>,
  pub annotated_frame_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingResult {
  #[serde(flatten)]
  pub extraction: ExtractionResult,
  pub tracking_summary: TrackingSummary,
  pub tracking_json_path: Option<PathBuf>,
  pub annotated_frame_path: Option<PathBuf>,
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunOutcome {
  ExtractionOnly(ExtractionResult),
  Detected(DetectionResult),
  Tracked(TrackingResult),
}

impl RunOutcome {
  pub fn mode(&self) -> PipelineMode {
    match self {
      RunOutcome::ExtractionOnly(_) => PipelineMode::ExtractOnly,
      RunOutcome::Detected(_) => PipelineMode::Detect,
      RunOutcome::Tracked(_) => PipelineMode::Track,
    }
  }

  pub fn extraction(&self) -> &ExtractionResult {
    match self {
      RunOutcome::ExtractionOnly(result) => result,
      RunOutcome::Detected(result) => &result.extraction,
      RunOutcome::Tracked(result) => &result.extraction,
    }
  }
}

/// 视频处理流水线
///
/// 按配置选择运行模式，驱动抽帧、推理与统计，并按开关写出结果文件。
/// 检测与跟踪模式需要通过 `with_model` 提供视觉模型；跟踪模型在每次运行前会被 `reset`。
pub struct VisionPipeline {
  config: Config,
  model: Option<Box<dyn VisionModel>>,
  renderer: Box<dyn Render>,
  writer: ArtifactWriter,
}

impl VisionPipeline {
  pub fn new(config: Config) -> Result<Self, PipelineError> {
    let renderer = Draw::from_config(&config.annotation)?;
    let writer = ArtifactWriter::new(config.extraction.output_dir.clone());
    Ok(Self {
      config,
      model: None,
      renderer: Box::new(renderer),
      writer,
    })
  }

  pub fn with_model(mut self, model: Box<dyn VisionModel>) -> Self {
    self.model = Some(model);
    self
  }

  pub fn with_renderer(mut self, renderer: Box<dyn Render>) -> Self {
    self.renderer = renderer;
    self
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn mode(&self) -> PipelineMode {
    self.config.mode()
  }

  fn check_model(&self, mode: PipelineMode) -> Result<(), PipelineError> {
    if mode != PipelineMode::ExtractOnly && self.model.is_none() {
      return Err(PipelineError::ModelMissing(mode));
    }
    Ok(())
  }

  /// 打开视频（路径或 URL）并处理
  pub fn process_video(&mut self, source: &str) -> Result<RunOutcome, PipelineError> {
    self.check_model(self.mode())?;
    let source = open_source(source, &self.config.extraction)?;
    self.process_source(source)
  }

  /// 处理已打开的帧源
  pub fn process_source<S: FrameSource>(&mut self, source: S) -> Result<RunOutcome, PipelineError> {
    let mode = self.mode();
    self.check_model(mode)?;

    let video = source.metadata().clone();
    if video.fps.is_nan() || video.fps <= 0.0 {
      return Err(InputError::read_failure(&video.path, format!("invalid frame rate {}", video.fps)).into());
    }
    info!(
      "处理视频: {} ({}x{}, {:.2} fps, {} 帧, 模式 {})",
      video.path, video.width, video.height, video.fps, video.total_frames, mode
    );

    let sampler = TemporalSampler::new(source, self.config.extraction.target_fps);
    let extraction_fps = sampler.target_fps();
    let retain_sample = self.config.extraction.save_sample_frame;
    let stem = video_stem(&video.path);

    let extraction = |frames_extracted: usize, sample_frame_path: Option<PathBuf>| ExtractionResult {
      video_info: video.clone(),
      frames_extracted,
      extraction_fps,
      sample_frame_path,
      processed_at: Utc::now().to_rfc3339(),
    };

    let outcome = match mode {
      PipelineMode::ExtractOnly => {
        let report = ExtractTask { retain_sample }.run_task(sampler, ())?;
        let sample_frame_path = self.save_sample(report.sample_frame.as_ref())?;
        RunOutcome::ExtractionOnly(extraction(report.frames_extracted, sample_frame_path))
      }
      PipelineMode::Detect => {
        let model = self
          .model
          .as_deref_mut()
          .ok_or(PipelineError::ModelMissing(mode))?;
        model.reset();
        let task = DetectTask {
          retain_sample,
          params: self.config.detection.params(),
        };
        let report = task.run_task(sampler, &*model)?;

        let sample_frame_path = self.save_sample(report.sample_frame.as_ref())?;
        let detections_json_path = if self.config.detection.save_detections_json {
          Some(
            self
              .writer
              .save_detections_json(&stem, &report.frame_detections)?,
          )
        } else {
          None
        };
        let annotated_frame_path = match &report.sample_frame {
          Some(frame) if self.config.detection.save_annotated_frame => {
            let annotations: Vec<Annotation> = report
              .frame_detections
              .iter()
              .filter(|f| f.frame_number == frame.frame_number())
              .flat_map(|f| f.detections.iter().map(Annotation::from))
              .collect();
            Some(self.save_annotated(frame, &annotations)?)
          }
          _ => None,
        };

        RunOutcome::Detected(DetectionResult {
          extraction: extraction(report.frames_extracted, sample_frame_path),
          detection_summary: report.summary,
          detections_json_path,
          annotated_frame_path,
        })
      }
      PipelineMode::Track => {
        let model = self
          .model
          .as_deref_mut()
          .ok_or(PipelineError::ModelMissing(mode))?;
        model.reset();
        let task = TrackTask {
          retain_sample,
          params: self.config.detection.params(),
        };
        let report = task.run_task(sampler, model)?;

        let sample_frame_path = self.save_sample(report.sample_frame.as_ref())?;
        let tracking_json_path = if self.config.tracking.save_tracking_json {
          Some(self.writer.save_tracking_json(
            &stem,
            &report.frame_trackings,
            &report.trajectories,
          )?)
        } else {
          None
        };
        let annotated_frame_path = match &report.sample_frame {
          Some(frame) if self.config.detection.save_annotated_frame => {
            let annotations: Vec<Annotation> = report
              .frame_trackings
              .iter()
              .filter(|f| f.frame_number == frame.frame_number())
              .flat_map(|f| f.tracked_detections.iter().map(Annotation::from))
              .collect();
            Some(self.save_annotated(frame, &annotations)?)
          }
          _ => None,
        };

        RunOutcome::Tracked(TrackingResult {
          extraction: extraction(report.frames_extracted, sample_frame_path),
          tracking_summary: report.summary,
          tracking_json_path,
          annotated_frame_path,
        })
      }
    };

    debug!("运行结束: {:?}", outcome.mode());
    Ok(outcome)
  }

  fn save_sample(&self, frame: Option<&SampledFrame>) -> Result<Option<PathBuf>, PipelineError> {
    match frame {
      Some(frame) => Ok(Some(self.writer.save_sample_frame(frame)?)),
      None => Ok(None),
    }
  }

  fn save_annotated(
    &self,
    frame: &SampledFrame,
    annotations: &[Annotation],
  ) -> Result<PathBuf, PipelineError> {
    Ok(
      self
        .writer
        .save_annotated_frame(frame, annotations, self.renderer.as_ref())?,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::SyntheticInput;

  fn config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.extraction.output_dir = dir.to_path_buf();
    config
  }

  #[test]
  fn mode_names_are_snake_case() {
    assert_eq!(PipelineMode::ExtractOnly.to_string(), "extract_only");
    assert_eq!(
      serde_json::to_value(PipelineMode::Track).unwrap(),
      serde_json::json!("track")
    );
  }

  #[test]
  fn detect_without_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.detection.enabled = true;

    let mut pipeline = VisionPipeline::new(config).unwrap();
    let source = SyntheticInput::new(10, 10.0, 8, 8).unwrap();
    let result = pipeline.process_source(source);
    assert!(matches!(
      result,
      Err(PipelineError::ModelMissing(PipelineMode::Detect))
    ));
  }

  #[test]
  fn extraction_only_writes_sample_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = VisionPipeline::new(config(dir.path())).unwrap();
    let source = SyntheticInput::new(20, 10.0, 16, 16).unwrap();

    let outcome = pipeline.process_source(source).unwrap();
    assert_eq!(outcome.mode(), PipelineMode::ExtractOnly);
    let extraction = outcome.extraction();
    assert_eq!(extraction.frames_extracted, 10);
    assert_eq!(extraction.extraction_fps, 5.0);
    let path = extraction.sample_frame_path.as_ref().unwrap();
    assert!(path.ends_with("sample_frame_0.png"));
    assert!(path.exists());
  }

  #[test]
  fn disabled_sample_frame_leaves_path_unset() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.extraction.save_sample_frame = false;

    let mut pipeline = VisionPipeline::new(config).unwrap();
    let outcome = pipeline
      .process_source(SyntheticInput::new(5, 5.0, 8, 8).unwrap())
      .unwrap();
    assert!(outcome.extraction().sample_frame_path.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[test]
  fn outcome_serializes_with_mode_tag() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = VisionPipeline::new(config(dir.path())).unwrap();
    let outcome = pipeline
      .process_source(SyntheticInput::new(5, 5.0, 8, 8).unwrap())
      .unwrap();

    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["mode"], "extraction_only");
    assert_eq!(value["frames_extracted"], 5);
    assert_eq!(value["video_info"]["codec"], "RAW");
  }
}
