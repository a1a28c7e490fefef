// 该文件是 Guancha （观察） 项目的一部分。
// src/model/replay.rs - 回放已记录的模型输出
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

use std::{collections::HashMap, path::Path};

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::BoundingBox,
  frame::SampledFrame,
  model::{ClassMap, DetectItem, DetectParams, ModelError, TrackItem, VisionModel},
};

#[derive(Debug, Clone, Deserialize)]
struct ReplayEntry {
  label: String,
  confidence: f32,
  /// [x_min, y_min, x_max, y_max]，像素坐标
  bbox: [f32; 4],
  #[serde(default)]
  track_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
  frames: HashMap<u64, Vec<ReplayEntry>>,
}

/// 回放模型：从 JSON 文件读取按帧序号记录的原始模型输出
///
/// ```json
/// {"frames": {"0": [{"label": "car", "confidence": 0.9, "bbox": [1, 2, 30, 40], "track_id": 7}]}}
/// ```
pub struct ReplayModel {
  frames: HashMap<u64, Vec<ReplayEntry>>,
  class_map: ClassMap,
  last_tracked: Option<u64>,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }
    ReplayModel::load(Path::new(&crate::url_path(url)))
  }
}

impl ReplayModel {
  pub fn load(path: &Path) -> Result<Self, ModelError> {
    info!("加载回放文件: {}", path.display());
    let data = std::fs::read_to_string(path).map_err(|source| ModelError::ReplayLoad {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json_str(&data).map_err(|source| ModelError::ReplayParse {
      path: path.display().to_string(),
      source,
    })
  }

  pub fn from_json_str(data: &str) -> Result<Self, serde_json::Error> {
    let file: ReplayFile = serde_json::from_str(data)?;
    debug!("回放文件包含 {} 帧记录", file.frames.len());
    Ok(Self {
      frames: file.frames,
      class_map: ClassMap::default(),
      last_tracked: None,
    })
  }

  pub fn with_class_map(mut self, class_map: ClassMap) -> Self {
    self.class_map = class_map;
    self
  }

  fn entries<'a>(
    &'a self,
    frame_number: u64,
    params: &'a DetectParams,
  ) -> impl Iterator<Item = (&'a ReplayEntry, DetectItem)> + 'a {
    self
      .frames
      .get(&frame_number)
      .into_iter()
      .flatten()
      .filter_map(move |entry| {
        let category = self.class_map.category(&entry.label)?;
        if !params.accepts(category, entry.confidence) {
          return None;
        }
        let item = DetectItem {
          class_name: category.to_string(),
          score: entry.confidence,
          bbox: BoundingBox::from_xyxy(entry.bbox),
        };
        Some((entry, item))
      })
  }
}

impl VisionModel for ReplayModel {
  fn detect(
    &self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<DetectItem>, ModelError> {
    Ok(self.entries(frame.frame_number(), params).map(|(_, item)| item).collect())
  }

  fn track(
    &mut self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<TrackItem>, ModelError> {
    let frame_number = frame.frame_number();
    if let Some(last) = self.last_tracked
      && frame_number <= last
    {
      return Err(ModelError::Inference(format!(
        "跟踪帧序号必须递增: 上一帧 {last}, 当前帧 {frame_number}"
      )));
    }

    let items: Vec<TrackItem> = self
      .entries(frame_number, params)
      .filter_map(|(entry, item)| entry.track_id.map(|track_id| TrackItem { track_id, item }))
      .collect();
    self.last_tracked = Some(frame_number);
    Ok(items)
  }

  fn reset(&mut self) {
    self.last_tracked = None;
  }
}
