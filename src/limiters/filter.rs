//! 过滤限流器
//!
//! 按规则允许或拒绝请求。规则按顺序匹配，第一个匹配的规则决定结果；
//! 没有规则匹配时使用 [`NoMatchPolicy`]。过滤器没有可变状态。

use crate::error::ReqGateError;
use crate::matchers::{HostMatcher, HostPattern};
use serde::{Deserialize, Serialize};
use tracing::trace;

fn default_allow() -> bool {
    true
}

/// 过滤规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(flatten)]
    pub pattern: HostPattern,
    /// 匹配时是否放行
    #[serde(default = "default_allow")]
    pub allow: bool,
}

impl FilterRule {
    /// 匹配时放行
    pub fn allow(pattern: HostPattern) -> Self {
        Self {
            pattern,
            allow: true,
        }
    }

    /// 匹配时拒绝
    pub fn deny(pattern: HostPattern) -> Self {
        Self {
            pattern,
            allow: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.pattern.validate()
    }
}

/// 无匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchPolicy {
    Allow,
    Deny,
}

impl NoMatchPolicy {
    /// 白名单模式下未匹配的请求被拒绝
    pub fn from_whitelist(whitelist: bool) -> Self {
        if whitelist {
            NoMatchPolicy::Deny
        } else {
            NoMatchPolicy::Allow
        }
    }
}

/// 过滤限流器
#[derive(Debug)]
pub struct FilterLimiter {
    rules: Vec<(HostMatcher, bool)>,
    no_match: NoMatchPolicy,
}

impl FilterLimiter {
    /// 创建过滤器
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 任一规则的匹配模式无效
    pub fn new(whitelist: bool, rules: Vec<FilterRule>) -> Result<Self, ReqGateError> {
        Self::with_policy(NoMatchPolicy::from_whitelist(whitelist), rules)
    }

    pub fn with_policy(
        no_match: NoMatchPolicy,
        rules: Vec<FilterRule>,
    ) -> Result<Self, ReqGateError> {
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.pattern.compile()?, rule.allow)))
            .collect::<Result<Vec<_>, ReqGateError>>()?;
        Ok(Self { rules, no_match })
    }

    /// 判断主机是否放行
    pub fn is_allowed(&self, host: &str) -> bool {
        for (matcher, allow) in &self.rules {
            if matcher.matches(host) {
                trace!("Filter rule {} decided {}: allow={}", matcher.as_str(), host, allow);
                return *allow;
            }
        }
        self.no_match == NoMatchPolicy::Allow
    }

    pub fn no_match_policy(&self) -> NoMatchPolicy {
        self.no_match
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
