//! 日志初始化模块
//!
//! 基于 tracing-subscriber 初始化日志输出，需要启用 `telemetry` feature。
//! 环境变量 `RUST_LOG` 优先于配置中的级别。
//!
//! # 示例
//!
//! ```rust
//! use reqgate::telemetry::{init_tracing, TelemetryConfig};
//!
//! let config = TelemetryConfig::new("reqgate=debug");
//! init_tracing(&config).ok();
//! ```

use crate::constants::DEFAULT_LOG_LEVEL;
use crate::error::ReqGateError;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 日志级别或过滤指令（例如 `info`、`reqgate=debug`）
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
    /// 输出事件的 target
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// 启用 JSON 输出
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// 初始化全局日志订阅者
///
/// # 返回
/// - `Ok(())`: 初始化成功
/// - `Err(ReqGateError::ConfigError)`: 过滤指令无效或已经初始化过
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ReqGateError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            ReqGateError::ConfigError(format!("无效的日志级别 '{}': {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ReqGateError::ConfigError(format!("日志初始化失败: {}", e)))?;

    info!("Tracing initialized, level={}", config.level);
    Ok(())
}
