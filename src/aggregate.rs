// 该文件是 Guancha （观察） 项目的一部分。
// src/aggregate.rs - 检测与跟踪结果统计
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

mod detection;
pub use self::detection::summarize_detections;

mod trajectory;
pub use self::trajectory::TrajectoryAggregator;
pub(crate) use self::trajectory::summarize_trajectories;

/// 均值，空集合时为 0.0
pub(crate) fn mean(sum: f64, count: usize) -> f64 {
  if count == 0 { 0.0 } else { sum / count as f64 }
}
