// 该文件是 Guancha （观察） 项目的一部分。
// src/model.rs - 视觉模型接口
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detection::BoundingBox, frame::SampledFrame};

mod replay;
pub use self::replay::ReplayModel;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("无法读取回放文件 {path}: {source}")]
  ReplayLoad {
    path: String,
    source: std::io::Error,
  },
  #[error("回放文件格式错误 {path}: {source}")]
  ReplayParse {
    path: String,
    source: serde_json::Error,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 单个检测框（模型输出，尚未关联帧信息）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_name: String,
  pub score: f32,
  pub bbox: BoundingBox,
}

/// 带跟踪编号的检测框
#[derive(Debug, Clone, PartialEq)]
pub struct TrackItem {
  pub track_id: u64,
  pub item: DetectItem,
}

/// 推理参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectParams {
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  pub target_classes: Vec<String>,
}

impl DetectParams {
  /// 类别在目标列表中且置信度不低于阈值
  pub fn accepts(&self, class_name: &str, score: f32) -> bool {
    score >= self.confidence_threshold && self.target_classes.iter().any(|c| c == class_name)
  }
}

/// 视觉模型
///
/// `detect` 无状态；`track` 有状态，同一视频内必须按帧序号递增调用，
/// 切换视频前须调用 `reset`。
pub trait VisionModel {
  fn detect(
    &self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<DetectItem>, ModelError>;

  fn track(
    &mut self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<TrackItem>, ModelError>;

  fn reset(&mut self);
}

impl<M: VisionModel + ?Sized> VisionModel for Box<M> {
  fn detect(
    &self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<DetectItem>, ModelError> {
    (**self).detect(frame, params)
  }

  fn track(
    &mut self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<TrackItem>, ModelError> {
    (**self).track(frame, params)
  }

  fn reset(&mut self) {
    (**self).reset()
  }
}

/// 模型原始标签到目标类别的映射
#[derive(Debug, Clone)]
pub struct ClassMap {
  map: HashMap<String, String>,
}

/// COCO 标签到目标类别
const COCO_CATEGORIES: [(&str, &str); 9] = [
  ("person", "person"),
  ("car", "vehicle"),
  ("motorcycle", "vehicle"),
  ("bus", "vehicle"),
  ("truck", "vehicle"),
  ("knife", "weapon"),
  ("backpack", "package"),
  ("suitcase", "package"),
  ("handbag", "package"),
];

impl Default for ClassMap {
  fn default() -> Self {
    COCO_CATEGORIES.iter().copied().collect()
  }
}

impl<'a> FromIterator<(&'a str, &'a str)> for ClassMap {
  fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
    Self {
      map: iter
        .into_iter()
        .map(|(label, category)| (label.to_string(), category.to_string()))
        .collect(),
    }
  }
}

impl ClassMap {
  /// 未映射的标签返回 `None`
  pub fn category(&self, label: &str) -> Option<&str> {
    self.map.get(label).map(String::as_str)
  }
}

pub enum ModelWrapper {
  Replay(ReplayModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayModel::SCHEME => Ok(ModelWrapper::Replay(ReplayModel::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl VisionModel for ModelWrapper {
  fn detect(
    &self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<DetectItem>, ModelError> {
    match self {
      ModelWrapper::Replay(model) => model.detect(frame, params),
    }
  }

  fn track(
    &mut self,
    frame: &SampledFrame,
    params: &DetectParams,
  ) -> Result<Vec<TrackItem>, ModelError> {
    match self {
      ModelWrapper::Replay(model) => model.track(frame, params),
    }
  }

  fn reset(&mut self) {
    match self {
      ModelWrapper::Replay(model) => model.reset(),
    }
  }
}
