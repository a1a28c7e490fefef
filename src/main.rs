// 该文件是 Guancha （观察） 项目的一部分。
// src/main.rs - 命令行主程序
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use guancha::{
  FromUrl,
  config::Config,
  logging,
  model::ModelWrapper,
  pipeline::{PipelineMode, RunOutcome, VisionPipeline},
};

/// Guancha 视频抽帧、检测与跟踪
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入视频路径，或 `gif://`、`video://`、`synthetic://` URL
  #[arg(short, long, value_name = "SOURCE")]
  pub input: String,
  /// YAML 配置文件，不存在时使用默认配置
  #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
  pub config: PathBuf,
  /// 输出目录
  #[arg(short, long, value_name = "DIR")]
  pub output: Option<PathBuf>,
  /// 目标抽帧帧率
  #[arg(long, value_name = "FPS")]
  pub fps: Option<f64>,
  /// 启用检测
  #[arg(long)]
  pub detect: bool,
  /// 启用跟踪（隐含检测）
  #[arg(long)]
  pub track: bool,
  /// 视觉模型 URL，例如 `replay:///data/clip.json`
  #[arg(long, value_name = "MODEL")]
  pub model: Option<String>,
  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

impl Args {
  /// 命令行参数覆盖配置文件
  fn apply(&self, config: &mut Config) {
    if let Some(output) = &self.output {
      config.extraction.output_dir = output.clone();
    }
    if let Some(fps) = self.fps {
      config.extraction.target_fps = fps;
    }
    if self.detect {
      config.detection.enabled = true;
    }
    if self.track {
      config.tracking.enabled = true;
    }
    if let Some(model) = &self.model {
      config.detection.model = Some(model.clone());
    }
  }
}

fn log_outcome(outcome: &RunOutcome) {
  let extraction = outcome.extraction();
  info!(
    "抽取 {} 帧 ({:.2} fps), 视频时长 {:.2} 秒",
    extraction.frames_extracted, extraction.extraction_fps, extraction.video_info.duration_seconds
  );
  match outcome {
    RunOutcome::ExtractionOnly(_) => {}
    RunOutcome::Detected(result) => {
      let summary = &result.detection_summary;
      info!(
        "检测: {} 个目标, 平均置信度 {:.2}, 有目标帧 {} / 无目标帧 {}",
        summary.total_detections,
        summary.avg_confidence,
        summary.frames_with_detections,
        summary.frames_without_detections
      );
      for (class_name, count) in &summary.by_class {
        info!("  {}: {}", class_name, count);
      }
    }
    RunOutcome::Tracked(result) => {
      let summary = &result.tracking_summary;
      info!(
        "跟踪: {} 个对象, 平均轨迹长度 {:.2}, 最长 {}",
        summary.total_unique_objects, summary.avg_track_length, summary.longest_track
      );
      for (class_name, count) in &summary.by_class {
        info!("  {}: {}", class_name, count);
      }
    }
  }
}

fn main() -> Result<()> {
  let args = Args::parse();
  logging::init(args.verbose)?;

  let mut config = Config::load(&args.config)?;
  args.apply(&mut config);
  config.validate()?;

  let mode = config.mode();
  info!("输入来源: {}", args.input);
  info!("运行模式: {}", mode);
  info!("输出目录: {}", config.extraction.output_dir.display());

  let model_url = config.detection.model.clone();
  let mut pipeline = VisionPipeline::new(config)?;
  if mode != PipelineMode::ExtractOnly {
    let model_url = model_url.context("检测/跟踪模式需要 --model 或 detection.model")?;
    let url = Url::parse(&model_url).with_context(|| format!("无效的模型 URL: {model_url}"))?;
    info!("加载模型: {}", url);
    let model = ModelWrapper::from_url(&url)?;
    pipeline = pipeline.with_model(Box::new(model));
  }

  let outcome = pipeline.process_video(&args.input)?;
  log_outcome(&outcome);
  println!("{}", serde_json::to_string_pretty(&outcome)?);

  Ok(())
}
