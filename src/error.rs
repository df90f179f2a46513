//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。所有错误都通过 `Response` 的错误槽传递，
//! 不会以 panic 的形式跨越中间件链。

use std::time::Duration;
use thiserror::Error;

/// 传输层错误来源
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// ReqGate 错误类型
#[derive(Error, Debug)]
pub enum ReqGateError {
    /// 请求构造错误（在任何 I/O 之前检测到）
    #[error("请求构造错误: {0}")]
    Malformed(String),

    /// 请求被拒绝（过滤器拒绝或中间件链未返回响应）
    #[error("请求被拒绝")]
    Rejected,

    /// 传输错误
    #[error("传输错误: {0}")]
    Transport(#[source] BoxError),

    /// 等待超时
    #[error("等待超时: {0:?}")]
    Timeout(Duration),

    /// 响应解码错误
    #[error("响应解码错误: {0}")]
    Decode(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl ReqGateError {
    /// 包装传输层错误
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ReqGateError::Transport(err.into())
    }

    /// 是否为请求被拒绝
    pub fn is_rejected(&self) -> bool {
        matches!(self, ReqGateError::Rejected)
    }

    /// 是否为超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReqGateError::Timeout(_))
    }

    /// 是否为请求构造错误
    pub fn is_malformed(&self) -> bool {
        matches!(self, ReqGateError::Malformed(_))
    }
}

impl From<regex::Error> for ReqGateError {
    fn from(err: regex::Error) -> Self {
        ReqGateError::ConfigError(format!("无效的正则表达式: {}", err))
    }
}

impl From<glob::PatternError> for ReqGateError {
    fn from(err: glob::PatternError) -> Self {
        ReqGateError::ConfigError(format!("无效的 glob 模式: {}", err))
    }
}
