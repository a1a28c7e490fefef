// 该文件是 Guancha （观察） 项目的一部分。
// src/config.rs - 配置
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{model::DetectParams, pipeline::PipelineMode};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 抽帧配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
  pub target_fps: f64,
  pub output_dir: PathBuf,
  pub save_sample_frame: bool,
  /// 允许的扩展名（含点号，大小写不敏感）
  pub supported_formats: Vec<String>,
}

impl Default for ExtractionConfig {
  fn default() -> Self {
    Self {
      target_fps: 5.0,
      output_dir: PathBuf::from("./output"),
      save_sample_frame: true,
      supported_formats: [".mp4", ".mov", ".avi", ".mkv", ".gif"]
        .into_iter()
        .map(String::from)
        .collect(),
    }
  }
}

/// 检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  pub enabled: bool,
  /// 模型 URL，例如 `replay:///data/clip.json`
  pub model: Option<String>,
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  pub target_classes: Vec<String>,
  pub save_annotated_frame: bool,
  pub save_detections_json: bool,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      model: None,
      confidence_threshold: 0.5,
      nms_threshold: 0.45,
      target_classes: ["person", "vehicle", "weapon", "package"]
        .into_iter()
        .map(String::from)
        .collect(),
      save_annotated_frame: true,
      save_detections_json: true,
    }
  }
}

impl DetectionConfig {
  pub fn params(&self) -> DetectParams {
    DetectParams {
      confidence_threshold: self.confidence_threshold,
      nms_threshold: self.nms_threshold,
      target_classes: self.target_classes.clone(),
    }
  }
}

/// 跟踪配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
  pub enabled: bool,
  pub save_tracking_json: bool,
}

impl Default for TrackingConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      save_tracking_json: true,
    }
  }
}

/// 标注图配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
  /// TrueType 字体路径；为空时只画框不写字
  pub font_path: Option<PathBuf>,
  pub font_size: f32,
}

impl Default for AnnotationConfig {
  fn default() -> Self {
    Self {
      font_path: None,
      font_size: 20.0,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub extraction: ExtractionConfig,
  pub detection: DetectionConfig,
  pub tracking: TrackingConfig,
  pub annotation: AnnotationConfig,
}

impl Config {
  /// 读取 YAML 配置文件，文件不存在时使用默认配置
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      info!("配置文件不存在, 使用默认配置: {}", path.display());
      return Ok(Self::default());
    }

    let data = std::fs::read_to_string(path)?;
    let config = Self::from_yaml_str(&data)?;
    debug!("已加载配置: {:?}", config);
    Ok(config)
  }

  pub fn from_yaml_str(data: &str) -> Result<Self, ConfigError> {
    if data.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(data)?)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let fps = self.extraction.target_fps;
    if fps.is_nan() || fps <= 0.0 {
      return Err(ConfigError::Invalid(format!(
        "target_fps 必须为正数: {fps}"
      )));
    }
    for (name, value) in [
      ("confidence_threshold", self.detection.confidence_threshold),
      ("nms_threshold", self.detection.nms_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
          "{name} 必须在 [0, 1] 之间: {value}"
        )));
      }
    }
    if self.annotation.font_size.is_nan() || self.annotation.font_size <= 0.0 {
      return Err(ConfigError::Invalid(format!(
        "font_size 必须为正数: {}",
        self.annotation.font_size
      )));
    }
    if self.extraction.supported_formats.is_empty() {
      return Err(ConfigError::Invalid("supported_formats 不能为空".into()));
    }
    Ok(())
  }

  /// 运行模式：跟踪优先于检测，跟踪隐含检测
  pub fn mode(&self) -> PipelineMode {
    if self.tracking.enabled {
      PipelineMode::Track
    } else if self.detection.enabled {
      PipelineMode::Detect
    } else {
      PipelineMode::ExtractOnly
    }
  }
}
