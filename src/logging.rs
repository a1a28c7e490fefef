// 该文件是 Guancha （观察） 项目的一部分。
// src/logging.rs - 日志初始化
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

use thiserror::Error;
use tracing::Level;

#[derive(Error, Debug)]
#[error("日志已初始化: {0}")]
pub struct LoggingError(String);

/// 初始化全局日志，输出到 stderr
///
/// 进程启动时调用一次；重复调用返回错误，不会重新配置。
pub fn init(verbose: bool) -> Result<(), LoggingError> {
  let level = if verbose { Level::DEBUG } else { Level::INFO };

  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(true)
    .with_writer(std::io::stderr)
    .try_init()
    .map_err(|e| LoggingError(e.to_string()))
}
