//! 并发限流器
//!
//! 每个键最多同时有 `parallelism` 个请求在下一个处理器中执行。许可在下游返回时
//! 释放（包括出错和 panic），不保证等待者的先后顺序。

use super::{count_states, evict_all, first_match, wait_for, RuleEntry};
use crate::error::ReqGateError;
use crate::matchers::HostPattern;
use crate::request::Request;
use crate::storage::{LimitScope, LimiterKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// 并发规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelismRule {
    #[serde(flatten)]
    pub pattern: HostPattern,
    /// 最大并发数
    pub parallelism: usize,
}

impl ParallelismRule {
    pub fn new(pattern: HostPattern, parallelism: usize) -> Self {
        Self {
            pattern,
            parallelism,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.parallelism == 0 {
            return Err(format!("规则 {} 的 parallelism 必须大于 0", self.pattern));
        }
        if self.parallelism > Semaphore::MAX_PERMITS {
            return Err(format!(
                "规则 {} 的 parallelism 过大（最大 {}）",
                self.pattern,
                Semaphore::MAX_PERMITS
            ));
        }
        self.pattern.validate()
    }
}

/// 并发状态
#[derive(Debug)]
pub struct ParallelismState {
    max: usize,
    semaphore: Arc<Semaphore>,
}

impl ParallelismState {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            semaphore: Arc::new(Semaphore::new(max)),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// 正在执行的请求数
    pub fn in_flight(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }
}

/// 并发限流器
pub struct ParallelismLimiter {
    scope: LimitScope,
    entries: Vec<RuleEntry<ParallelismRule, ParallelismState>>,
}

impl ParallelismLimiter {
    /// 创建并发限流器
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 规则无效或 parallelism 为 0
    pub fn new(scope: LimitScope, rules: Vec<ParallelismRule>) -> Result<Self, ReqGateError> {
        let entries = rules
            .into_iter()
            .map(|rule| {
                rule.validate().map_err(ReqGateError::ConfigError)?;
                let pattern = rule.pattern.clone();
                RuleEntry::compile(&pattern, rule)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { scope, entries })
    }

    /// 获取并发许可
    ///
    /// 没有规则匹配时返回 `Ok(None)`。
    pub async fn acquire(
        &self,
        req: &Request,
        host: &str,
    ) -> Result<Option<OwnedSemaphorePermit>, ReqGateError> {
        let Some(entry) = first_match(&self.entries, host) else {
            return Ok(None);
        };

        let key = self.scope.key_for(host);
        let max = entry.rule.parallelism;
        let state = entry
            .states
            .get_or_create(key, || ParallelismState::new(max));

        trace!(
            "Parallelism for {}: {}/{} in flight",
            host,
            state.in_flight(),
            state.max()
        );

        let permit = wait_for(req, Arc::clone(&state.semaphore).acquire_owned())
            .await?
            .map_err(|_| ReqGateError::ConfigError("并发信号量已关闭".to_string()))?;

        debug!("Parallelism permit acquired for {}", host);
        Ok(Some(permit))
    }

    pub fn scope(&self) -> LimitScope {
        self.scope
    }

    /// 某个键正在执行的请求数
    pub fn in_flight(&self, key: &LimiterKey) -> usize {
        self.entries
            .iter()
            .filter_map(|entry| entry.states.get(key))
            .map(|state| state.in_flight())
            .sum()
    }

    pub fn evict(&self, key: &LimiterKey) -> usize {
        evict_all(&self.entries, key)
    }

    pub fn state_count(&self) -> usize {
        count_states(&self.entries)
    }
}
