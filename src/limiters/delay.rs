//! 延迟限流器
//!
//! 保证共享同一个键的请求之间至少间隔 `delay`，并可额外加入 `[0, random_delay)`
//! 的随机抖动。持有同一个键的请求是串行的：锁在下一个处理器返回之后才释放，
//! 释放时记录本次请求的结束时间。

use super::{count_states, evict_all, first_match, wait_for, RuleEntry};
use crate::error::ReqGateError;
use crate::matchers::HostPattern;
use crate::request::Request;
use crate::storage::{LimitScope, LimiterKey};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, trace};

/// 延迟规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRule {
    #[serde(flatten)]
    pub pattern: HostPattern,
    /// 最小请求间隔
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// 随机抖动上限
    #[serde(default, with = "humantime_serde")]
    pub random_delay: Duration,
}

impl DelayRule {
    pub fn new(pattern: HostPattern, delay: Duration) -> Self {
        Self {
            pattern,
            delay,
            random_delay: Duration::ZERO,
        }
    }

    pub fn with_random_delay(mut self, random_delay: Duration) -> Self {
        self.random_delay = random_delay;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.pattern.validate()
    }
}

/// 延迟状态
#[derive(Debug, Default)]
pub struct DelayState {
    /// 上一次请求结束的时间
    pub last_request: Option<Instant>,
}

/// 延迟许可
///
/// 持有键的锁；释放时记录请求时间，下游失败时同样记录。
/// 同一请求再次经过同一个限流器时得到的是不持锁的重入许可，释放时不做记录。
pub struct DelayPermit {
    limiter_id: u64,
    key: LimiterKey,
    guard: Option<OwnedMutexGuard<DelayState>>,
}

impl DelayPermit {
    pub fn limiter_id(&self) -> u64 {
        self.limiter_id
    }

    pub fn key(&self) -> &LimiterKey {
        &self.key
    }

    /// 是否持有键的锁
    pub fn is_owner(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for DelayPermit {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.as_mut() {
            guard.last_request = Some(Instant::now());
        }
    }
}

static NEXT_LIMITER_ID: AtomicU64 = AtomicU64::new(1);

/// 延迟限流器
///
/// 许可在下游返回前一直持有键的锁，因此同一个键上的请求是串行的。
/// 同一个限流器在链中注册多次时，内层包装识别出请求已持有该键的锁，
/// 直接放行而不再加锁。
pub struct DelayLimiter {
    id: u64,
    scope: LimitScope,
    entries: Vec<RuleEntry<DelayRule, Mutex<DelayState>>>,
}

impl DelayLimiter {
    /// 创建延迟限流器
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 任一规则的匹配模式无效
    pub fn new(scope: LimitScope, rules: Vec<DelayRule>) -> Result<Self, ReqGateError> {
        let entries = rules
            .into_iter()
            .map(|rule| {
                rule.validate().map_err(ReqGateError::ConfigError)?;
                let pattern = rule.pattern.clone();
                RuleEntry::compile(&pattern, rule)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: NEXT_LIMITER_ID.fetch_add(1, Ordering::Relaxed),
            scope,
            entries,
        })
    }

    /// 获取延迟许可
    ///
    /// 没有规则匹配时返回 `Ok(None)`。请求已持有该键的锁时立即返回重入许可。
    pub async fn acquire(
        &self,
        req: &Request,
        host: &str,
    ) -> Result<Option<DelayPermit>, ReqGateError> {
        let Some(entry) = first_match(&self.entries, host) else {
            return Ok(None);
        };

        let key = self.scope.key_for(host);
        if req.holds_delay(self.id, &key) {
            trace!("Request {} already holds delay lock for {}", req.id(), key);
            return Ok(Some(DelayPermit {
                limiter_id: self.id,
                key,
                guard: None,
            }));
        }

        let state = entry
            .states
            .get_or_create(key.clone(), || Mutex::new(DelayState::default()));
        let rule = &entry.rule;
        let limiter_id = self.id;

        let permit = wait_for(req, async move {
            let guard = state.lock_owned().await;

            if let Some(last) = guard.last_request {
                let elapsed = last.elapsed();
                if elapsed < rule.delay {
                    trace!("Delaying {} for {:?}", key, rule.delay - elapsed);
                    tokio::time::sleep(rule.delay - elapsed).await;
                }
            }

            if !rule.random_delay.is_zero() {
                let jitter = rand::thread_rng().gen_range(Duration::ZERO..rule.random_delay);
                trace!("Random delay {:?} for {}", jitter, key);
                tokio::time::sleep(jitter).await;
            }

            DelayPermit {
                limiter_id,
                key,
                guard: Some(guard),
            }
        })
        .await?;

        debug!("Delay permit acquired for {}", host);
        Ok(Some(permit))
    }

    pub fn scope(&self) -> LimitScope {
        self.scope
    }

    /// 某个键最近一次请求的时间
    pub fn last_request(&self, key: &LimiterKey) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|entry| entry.states.get(key))
            .filter_map(|state| {
                // 持有中的键视为尚未记录
                let last = state.try_lock().ok()?.last_request;
                last
            })
            .max()
    }

    pub fn evict(&self, key: &LimiterKey) -> usize {
        evict_all(&self.entries, key)
    }

    pub fn state_count(&self) -> usize {
        count_states(&self.entries)
    }
}
