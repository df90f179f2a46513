//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 匹配器模块
//!
//! 判断一条限流规则是否作用于请求的目标主机。
//!
//! # 匹配方式
//!
//! - glob（大小写不敏感，例如 `*.example.com`）
//! - 正则表达式（非锚定匹配，与 `Regex::is_match` 语义一致）
//!
//! 规则中的 [`HostPattern`] 是未编译的配置，只有通过 [`HostPattern::compile`]
//! 得到 [`HostMatcher`] 之后才能进行匹配，因此不存在"未编译就匹配"的情况。

use crate::constants::MAX_PATTERN_LEN;
use crate::error::ReqGateError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};
use url::Url;

/// 主机匹配模式（未编译）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPattern {
    /// glob 模式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    /// 正则表达式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
}

impl HostPattern {
    /// 使用 glob 模式创建
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            glob: Some(pattern.into()),
            regexp: None,
        }
    }

    /// 使用正则表达式创建
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            glob: None,
            regexp: Some(pattern.into()),
        }
    }

    /// 匹配所有主机
    pub fn any() -> Self {
        Self::glob("*")
    }

    /// 校验模式
    pub fn validate(&self) -> Result<(), String> {
        match (&self.glob, &self.regexp) {
            (None, None) => Err("必须提供 glob 或 regexp".to_string()),
            (Some(glob), _) => validate_pattern_len(glob),
            (None, Some(regexp)) => validate_pattern_len(regexp),
        }
    }

    /// 编译模式
    ///
    /// 同时提供 glob 和 regexp 时以 glob 为准。
    ///
    /// # 返回
    /// - `Ok(HostMatcher)`: 编译成功
    /// - `Err(ReqGateError::ConfigError)`: 模式为空、过长或语法错误
    pub fn compile(&self) -> Result<HostMatcher, ReqGateError> {
        self.validate().map_err(ReqGateError::ConfigError)?;

        let compiled = match (&self.glob, &self.regexp) {
            (Some(glob), regexp) => {
                if regexp.is_some() {
                    warn!(
                        "Both glob and regexp supplied, glob '{}' takes precedence",
                        glob
                    );
                }
                Compiled::Glob(glob::Pattern::new(glob)?)
            }
            (None, Some(regexp)) => Compiled::Regex(Regex::new(regexp)?),
            (None, None) => {
                return Err(ReqGateError::ConfigError(
                    "必须提供 glob 或 regexp".to_string(),
                ))
            }
        };

        Ok(HostMatcher { compiled })
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.glob, &self.regexp) {
            (Some(glob), _) => write!(f, "glob:{}", glob),
            (None, Some(regexp)) => write!(f, "regexp:{}", regexp),
            (None, None) => write!(f, "<empty>"),
        }
    }
}

fn validate_pattern_len(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("匹配模式不能为空".to_string());
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(format!("匹配模式过长（最大 {} 字符）", MAX_PATTERN_LEN));
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Compiled {
    Glob(glob::Pattern),
    Regex(Regex),
}

/// 已编译的主机匹配器
///
/// 编译后只读，可被多个任务并发使用。
#[derive(Debug, Clone)]
pub struct HostMatcher {
    compiled: Compiled,
}

impl HostMatcher {
    /// 判断主机是否匹配
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        let matched = match &self.compiled {
            Compiled::Glob(pattern) => pattern.matches_with(
                &host,
                glob::MatchOptions {
                    case_sensitive: false,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                },
            ),
            Compiled::Regex(regex) => regex.is_match(&host),
        };
        trace!("Host {} matched {}: {}", host, self.as_str(), matched);
        matched
    }

    /// 原始模式字符串
    pub fn as_str(&self) -> &str {
        match &self.compiled {
            Compiled::Glob(pattern) => pattern.as_str(),
            Compiled::Regex(regex) => regex.as_str(),
        }
    }
}

/// 提取 URL 的主机键（小写 host，显式端口时为 `host:port`）
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
