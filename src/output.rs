// 该文件是 Guancha （观察） 项目的一部分。
// src/output.rs - 结果文件输出
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  detection::{FrameDetections, FrameTracking, ObjectTrajectory},
  frame::SampledFrame,
};

pub mod draw;
pub use self::draw::{Annotation, Draw};

pub mod json_export;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("字体错误: {0}")]
  Font(String),
}

/// 标注渲染器：在图像副本上绘制标注
pub trait Render {
  fn render_result(&self, image: &RgbImage, annotations: &[Annotation]) -> RgbImage;
}

/// 结果文件写入器，所有文件写入同一输出目录
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
  output_dir: PathBuf,
}

impl ArtifactWriter {
  pub fn new(output_dir: impl Into<PathBuf>) -> Self {
    Self {
      output_dir: output_dir.into(),
    }
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  fn target(&self, filename: String) -> Result<PathBuf, OutputError> {
    if !self.output_dir.exists() {
      std::fs::create_dir_all(&self.output_dir)?;
      debug!("创建输出目录: {}", self.output_dir.display());
    }
    Ok(self.output_dir.join(filename))
  }

  /// 保存采样帧：`sample_frame_{n}.png`
  pub fn save_sample_frame(&self, frame: &SampledFrame) -> Result<PathBuf, OutputError> {
    let path = self.target(format!("sample_frame_{}.png", frame.frame_number()))?;
    frame.image.save(&path)?;
    info!("保存采样帧: {}", path.display());
    Ok(path)
  }

  /// 保存标注图：`annotated_frame_{n}.png`
  pub fn save_annotated_frame(
    &self,
    frame: &SampledFrame,
    annotations: &[Annotation],
    renderer: &dyn Render,
  ) -> Result<PathBuf, OutputError> {
    let path = self.target(format!("annotated_frame_{}.png", frame.frame_number()))?;
    let image = renderer.render_result(&frame.image, annotations);
    image.save(&path)?;
    info!("保存标注图 ({} 个目标): {}", annotations.len(), path.display());
    Ok(path)
  }

  /// 保存逐帧检测结果：`{stem}_detections.json`
  pub fn save_detections_json(
    &self,
    stem: &str,
    frames: &[FrameDetections],
  ) -> Result<PathBuf, OutputError> {
    let path = self.target(format!("{stem}_detections.json"))?;
    json_export::write_detections(&path, frames)?;
    info!("保存检测结果: {}", path.display());
    Ok(path)
  }

  /// 保存逐帧跟踪结果与轨迹：`{stem}_tracking.json`
  pub fn save_tracking_json(
    &self,
    stem: &str,
    frames: &[FrameTracking],
    trajectories: &[ObjectTrajectory],
  ) -> Result<PathBuf, OutputError> {
    let path = self.target(format!("{stem}_tracking.json"))?;
    json_export::write_tracking(&path, frames, trajectories)?;
    info!("保存跟踪结果: {}", path.display());
    Ok(path)
  }
}

/// 由视频路径得到输出文件名前缀
pub fn video_stem(path: &str) -> String {
  Path::new(path)
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .filter(|stem| !stem.is_empty())
    .unwrap_or_else(|| "video".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::FrameMetadata;

  fn frame(frame_number: u64) -> SampledFrame {
    SampledFrame {
      image: RgbImage::new(16, 12),
      metadata: FrameMetadata {
        frame_number,
        timestamp_ms: 0.0,
        source_fps: 30.0,
        extraction_fps: 5.0,
        width: 16,
        height: 12,
        source_path: "clip.gif".to_string(),
      },
    }
  }

  #[test]
  fn stem_strips_directory_and_extension() {
    assert_eq!(video_stem("/data/videos/lobby cam.mp4"), "lobby cam");
    assert_eq!(video_stem("synthetic"), "synthetic");
    assert_eq!(video_stem(""), "video");
  }

  #[test]
  fn sample_frame_creates_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path().join("nested/out"));

    let path = writer.save_sample_frame(&frame(6)).unwrap();
    assert!(path.ends_with("sample_frame_6.png"));
    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (16, 12));
  }
}
