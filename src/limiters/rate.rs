//! 速率限流器（固定窗口）
//!
//! 每个键持有 `rate` 个令牌。后台任务每隔一个窗口（默认 1 秒）把所有已知键的
//! 令牌重置为 `rate`，这是整体重置而不是漏桶。令牌用完的请求在通知上挂起，
//! 直到下一次重置。令牌不会归还。
//!
//! 窗口开始时最多放行 `rate` 个请求，跨越窗口边界时最多放行 `2 × rate` 个。

use super::{count_states, first_match, wait_for, RuleEntry};
use crate::constants::DEFAULT_REFILL_INTERVAL;
use crate::error::ReqGateError;
use crate::matchers::HostPattern;
use crate::request::Request;
use crate::storage::{LimitScope, LimiterKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// 速率规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    #[serde(flatten)]
    pub pattern: HostPattern,
    /// 每个窗口的请求数
    pub rate: u64,
}

impl RateRule {
    pub fn new(pattern: HostPattern, rate: u64) -> Self {
        Self { pattern, rate }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 {
            return Err(format!("规则 {} 的 rate 必须大于 0", self.pattern));
        }
        self.pattern.validate()
    }
}

/// 速率状态
#[derive(Debug)]
pub struct RateState {
    rate: u64,
    tokens: AtomicU64,
    refilled: Notify,
}

impl RateState {
    /// 新状态令牌是满的
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            tokens: AtomicU64::new(rate),
            refilled: Notify::new(),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// 剩余令牌
    pub fn tokens(&self) -> u64 {
        self.tokens.load(Ordering::Acquire)
    }

    /// 尝试取一个令牌
    pub fn try_take(&self) -> bool {
        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// 等待直到取到令牌
    pub async fn take(&self) {
        loop {
            // 先注册通知再检查，避免错过检查与挂起之间的重置
            let notified = self.refilled.notified();
            if self.try_take() {
                return;
            }
            notified.await;
        }
    }

    /// 重置为满并唤醒所有等待者
    pub fn refill(&self) {
        self.tokens.store(self.rate, Ordering::Release);
        self.refilled.notify_waiters();
    }
}

struct RateInner {
    scope: LimitScope,
    entries: Vec<RuleEntry<RateRule, RateState>>,
}

impl RateInner {
    fn refill_all(&self) {
        for entry in &self.entries {
            entry.states.for_each(|_, state| state.refill());
        }
        trace!("Rate windows refilled");
    }
}

/// 速率限流器
///
/// 重置任务由限流器拥有，限流器被释放或调用 [`RateLimiter::shutdown`] 时停止。
/// 停止后令牌不再恢复，等待中的请求只能由截止时间结束。
pub struct RateLimiter {
    inner: Arc<RateInner>,
    refill_interval: Duration,
    refill_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// 创建速率限流器（1 秒窗口）
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 规则无效、rate 为 0 或不在 tokio 运行时中
    pub fn new(scope: LimitScope, rules: Vec<RateRule>) -> Result<Self, ReqGateError> {
        Self::with_refill_interval(scope, rules, DEFAULT_REFILL_INTERVAL)
    }

    /// 使用自定义窗口长度创建
    pub fn with_refill_interval(
        scope: LimitScope,
        rules: Vec<RateRule>,
        refill_interval: Duration,
    ) -> Result<Self, ReqGateError> {
        if refill_interval.is_zero() {
            return Err(ReqGateError::ConfigError("重置间隔必须大于 0".to_string()));
        }

        let entries = rules
            .into_iter()
            .map(|rule| {
                rule.validate().map_err(ReqGateError::ConfigError)?;
                let pattern = rule.pattern.clone();
                RuleEntry::compile(&pattern, rule)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let inner = Arc::new(RateInner { scope, entries });
        let handle = Self::start_refill_task(Arc::downgrade(&inner), refill_interval)?;

        Ok(Self {
            inner,
            refill_interval,
            refill_handle: Mutex::new(Some(handle)),
        })
    }

    /// 启动重置任务
    ///
    /// 任务只持有弱引用，限流器释放后自行退出。
    fn start_refill_task(
        inner: Weak<RateInner>,
        period: Duration,
    ) -> Result<JoinHandle<()>, ReqGateError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ReqGateError::ConfigError("速率限流器必须在 tokio 运行时中创建".to_string())
        })?;

        info!("Starting rate refill task, period={:?}", period);
        let first_tick = Instant::now() + period;
        Ok(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.refill_all();
            }
            debug!("Rate refill task stopped");
        }))
    }

    /// 获取令牌
    ///
    /// 规则匹配并取到令牌时返回 `Ok(true)`，没有规则匹配时返回 `Ok(false)`。
    pub async fn acquire(&self, req: &Request, host: &str) -> Result<bool, ReqGateError> {
        let Some(entry) = first_match(&self.inner.entries, host) else {
            return Ok(false);
        };

        let key = self.inner.scope.key_for(host);
        let rate = entry.rule.rate;
        let state = entry.states.get_or_create(key, || RateState::new(rate));

        if !state.try_take() {
            debug!("Rate window exhausted for {}, waiting", host);
            wait_for(req, state.take()).await?;
        }
        Ok(true)
    }

    /// 立即重置所有窗口
    pub fn refill_now(&self) {
        self.inner.refill_all();
    }

    /// 某个键的剩余令牌
    pub fn tokens(&self, key: &LimiterKey) -> Option<u64> {
        self.inner
            .entries
            .iter()
            .find_map(|entry| entry.states.get(key))
            .map(|state| state.tokens())
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// 重置任务是否在运行
    pub fn is_running(&self) -> bool {
        self.refill_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 移除状态，被移除状态上的等待者立即放行
    pub fn evict(&self, key: &LimiterKey) -> usize {
        let mut removed = 0;
        for entry in &self.inner.entries {
            if let Some(state) = entry.states.evict(key) {
                state.refill();
                removed += 1;
            }
        }
        removed
    }

    pub fn state_count(&self) -> usize {
        count_states(&self.inner.entries)
    }

    /// 停止重置任务
    pub fn shutdown(&self) {
        if let Some(handle) = self.refill_handle.lock().take() {
            handle.abort();
            info!("Rate refill task aborted");
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(handle) = self.refill_handle.get_mut().take() {
            handle.abort();
        }
    }
}
