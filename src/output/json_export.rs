// 该文件是 Guancha （观察） 项目的一部分。
// src/output/json_export.rs - JSON 结果导出
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

use std::{fs::File, io::BufWriter, io::Write, path::Path};

use serde::Serialize;

use crate::{
  detection::{FrameDetections, FrameTracking, ObjectTrajectory},
  output::OutputError,
};

#[derive(Serialize)]
struct TrackingExport<'a> {
  frames: &'a [FrameTracking],
  trajectories: &'a [ObjectTrajectory],
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
  let mut writer = BufWriter::new(File::create(path)?);
  serde_json::to_writer_pretty(&mut writer, value)?;
  writer.write_all(b"\n")?;
  writer.flush()?;
  Ok(())
}

/// 逐帧检测结果，顶层为数组
pub fn write_detections(path: &Path, frames: &[FrameDetections]) -> Result<(), OutputError> {
  write_pretty(path, frames)
}

/// 逐帧跟踪结果与轨迹：`{"frames": [...], "trajectories": [...]}`
pub fn write_tracking(
  path: &Path,
  frames: &[FrameTracking],
  trajectories: &[ObjectTrajectory],
) -> Result<(), OutputError> {
  write_pretty(
    path,
    &TrackingExport {
      frames,
      trajectories,
    },
  )
}
