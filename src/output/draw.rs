// 该文件是 Guancha （观察） 项目的一部分。
// src/output/draw.rs - 标注图绘制
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use tracing::debug;

use crate::{
  config::AnnotationConfig,
  detection::{BoundingBox, Detection, TrackedDetection},
  output::{OutputError, Render},
};

const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;

/// 一个待绘制的目标
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  /// 标签前缀：检测模式为类别，跟踪模式为对象标识
  pub label: String,
  /// 类别，决定颜色
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

impl Annotation {
  pub fn text(&self) -> String {
    format!("{} {:.2}", self.label, self.confidence)
  }
}

impl From<&Detection> for Annotation {
  fn from(detection: &Detection) -> Self {
    Self {
      label: detection.class_name.clone(),
      class_name: detection.class_name.clone(),
      confidence: detection.confidence,
      bbox: detection.bbox,
    }
  }
}

impl From<&TrackedDetection> for Annotation {
  fn from(tracked: &TrackedDetection) -> Self {
    Self {
      label: tracked.object_id.clone(),
      class_name: tracked.class_name.clone(),
      confidence: tracked.confidence,
      bbox: tracked.bbox,
    }
  }
}

/// 类别颜色
pub fn category_color(class_name: &str) -> Rgb<u8> {
  match class_name {
    "weapon" => Rgb([255, 0, 0]),
    "person" => Rgb([255, 255, 0]),
    "vehicle" => Rgb([0, 255, 0]),
    "package" => Rgb([0, 0, 255]),
    _ => Rgb([128, 128, 128]),
  }
}

/// 边框与标签绘制器
///
/// 未配置字体时只画边框和标签底色。
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self::with_font(None, 20.0)
  }
}

impl Draw {
  pub fn with_font(font: Option<FontArc>, font_size: f32) -> Self {
    Self {
      font,
      font_size,
      label_text_height: ((font_size * 1.2).ceil() as i32).max(1),
      label_char_width: font_size * 0.55,
    }
  }

  pub fn from_config(config: &AnnotationConfig) -> Result<Self, OutputError> {
    let font = match &config.font_path {
      Some(path) => {
        let data = std::fs::read(path)?;
        let font = FontArc::try_from_vec(data)
          .map_err(|e| OutputError::Font(format!("{}: {e}", path.display())))?;
        debug!("已加载标注字体: {}", path.display());
        Some(font)
      }
      None => None,
    };
    Ok(Self::with_font(font, config.font_size))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, annotation: &Annotation) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let bbox = annotation.bbox;

    let x_min = bbox.x.clamp(0, w - 1);
    let y_min = bbox.y.clamp(0, h - 1);
    let x_max = bbox.x.saturating_add(bbox.width).clamp(0, w - 1);
    let y_max = bbox.y.saturating_add(bbox.height).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = category_color(&annotation.class_name);

    // 2 像素边框
    for thickness in 0..2 {
      let width = x_max - x_min + 1 - 2 * thickness;
      let height = y_max - y_min + 1 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = annotation.text();
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x);
    if label_width <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, self.label_text_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([0u8, 0u8, 0u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}

impl Render for Draw {
  fn render_result(&self, image: &RgbImage, annotations: &[Annotation]) -> RgbImage {
    let mut canvas = image.clone();
    for annotation in annotations {
      self.draw_bbox_with_label(&mut canvas, annotation);
    }
    canvas
  }
}
