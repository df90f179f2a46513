//! 配置模块
//!
//! 定义客户端的传输配置和请求治理规则。配置可以从 YAML 或 TOML 加载，
//! 时长使用 humantime 格式（例如 `500ms`、`2s`）。
//!
//! ```yaml
//! transport:
//!   timeout: 30s
//! governance:
//!   filter:
//!     whitelist: false
//!     rules:
//!       - glob: "*.ads.example.com"
//!         allow: false
//!   delay:
//!     scope: per_host
//!     rules:
//!       - glob: "*"
//!         delay: 1s
//!         random_delay: 500ms
//!   rate:
//!     rules:
//!       - regexp: "api\\.example\\.com"
//!         rate: 10
//!   parallelism:
//!     scope: per_host
//!     rules:
//!       - glob: "*"
//!         parallelism: 4
//! ```

use crate::error::ReqGateError;
use crate::limiters::{DelayRule, FilterRule, ParallelismRule, RateRule};
use crate::matchers::HostPattern;
use crate::storage::LimitScope;
use crate::transport::TransportConfig;
use ahash::AHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// 客户端配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
}

impl ClientConfig {
    /// 从 YAML 字符串加载并校验
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ReqGateError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate().map_err(ReqGateError::ConfigError)?;
        Ok(config)
    }

    /// 从 TOML 字符串加载并校验
    pub fn from_toml_str(toml: &str) -> Result<Self, ReqGateError> {
        let config: Self = toml::from_str(toml)?;
        config.validate().map_err(ReqGateError::ConfigError)?;
        Ok(config)
    }

    /// 从文件加载（按扩展名识别格式）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReqGateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!("Loading config from {}", path.display());

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(ReqGateError::ConfigError(format!(
                "无法识别的配置文件格式: {}",
                path.display()
            ))),
        }
    }

    /// 序列化为 YAML
    pub fn to_yaml_string(&self) -> Result<String, ReqGateError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        self.transport
            .validate()
            .map_err(|e| format!("transport: {}", e))?;
        self.governance.validate()
    }
}

/// 请求治理配置
///
/// 工厂按 filter、delay、rate、parallelism 的顺序安装中间件。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<ScopedRules<DelayRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<ScopedRules<RateRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<ScopedRules<ParallelismRule>>,
}

impl GovernanceConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if let Some(filter) = &self.filter {
            // 白名单模式下的空规则表示拒绝所有请求
            if filter.whitelist {
                validate_rule_list("filter", &filter.rules)?;
            } else {
                validate_rules("filter", &filter.rules)?;
            }
        }
        if let Some(delay) = &self.delay {
            validate_rules("delay", &delay.rules)?;
        }
        if let Some(rate) = &self.rate {
            validate_rules("rate", &rate.rules)?;
        }
        if let Some(parallelism) = &self.parallelism {
            validate_rules("parallelism", &parallelism.rules)?;
        }
        Ok(())
    }

    /// 是否配置了任何治理规则
    pub fn is_empty(&self) -> bool {
        self.filter.is_none()
            && self.delay.is_none()
            && self.rate.is_none()
            && self.parallelism.is_none()
    }
}

/// 过滤配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// 白名单模式：未匹配任何规则的请求被拒绝
    #[serde(default)]
    pub whitelist: bool,
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

/// 带作用域的规则列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedRules<R> {
    #[serde(default)]
    pub scope: LimitScope,
    pub rules: Vec<R>,
}

impl<R> ScopedRules<R> {
    pub fn new(scope: LimitScope, rules: Vec<R>) -> Self {
        Self { scope, rules }
    }
}

trait GovernanceRule {
    fn pattern(&self) -> &HostPattern;
    fn validate(&self) -> Result<(), String>;
}

impl GovernanceRule for FilterRule {
    fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    fn validate(&self) -> Result<(), String> {
        FilterRule::validate(self)
    }
}

impl GovernanceRule for DelayRule {
    fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    fn validate(&self) -> Result<(), String> {
        DelayRule::validate(self)
    }
}

impl GovernanceRule for RateRule {
    fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    fn validate(&self) -> Result<(), String> {
        RateRule::validate(self)
    }
}

impl GovernanceRule for ParallelismRule {
    fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    fn validate(&self) -> Result<(), String> {
        ParallelismRule::validate(self)
    }
}

fn validate_rules<R: GovernanceRule>(section: &str, rules: &[R]) -> Result<(), String> {
    if rules.is_empty() {
        return Err(format!("{}: 至少需要一个规则", section));
    }
    validate_rule_list(section, rules)
}

fn validate_rule_list<R: GovernanceRule>(section: &str, rules: &[R]) -> Result<(), String> {
    // 重复的模式意味着后面的规则永远不会生效
    let mut seen = HashSet::new();
    for (index, rule) in rules.iter().enumerate() {
        rule.validate()
            .map_err(|e| format!("{}: 规则[{}]校验失败: {}", section, index, e))?;
        if !seen.insert(rule.pattern().to_string()) {
            return Err(format!(
                "{}: 规则[{}]的匹配模式重复: {}",
                section,
                index,
                rule.pattern()
            ));
        }
    }
    Ok(())
}
