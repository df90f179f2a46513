//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 限流器模块
//!
//! 四种按主机规则生效的请求治理策略：
//! - [`FilterLimiter`]: 允许/拒绝
//! - [`DelayLimiter`]: 请求间隔
//! - [`RateLimiter`]: 固定窗口速率
//! - [`ParallelismLimiter`]: 并发上限
//!
//! 每种策略都通过 [`LimiterMiddleware`] 接入中间件链。规则按注册顺序匹配，
//! 第一个匹配的规则生效；没有规则匹配的请求原样放行（过滤器除外，它使用
//! 无匹配策略）。

pub mod delay;
pub mod filter;
pub mod parallelism;
pub mod rate;

pub use delay::{DelayLimiter, DelayPermit, DelayRule, DelayState};
pub use filter::{FilterLimiter, FilterRule, NoMatchPolicy};
pub use parallelism::{ParallelismLimiter, ParallelismRule, ParallelismState};
pub use rate::{RateLimiter, RateRule, RateState};

use crate::error::ReqGateError;
use crate::matchers::{HostMatcher, HostPattern};
use crate::middleware::{BoxHandler, Handler, Middleware};
use crate::request::Request;
use crate::response::Response;
use crate::storage::{LimitScope, LimiterKey, StateStore};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, trace, warn};

// ============================================================================
// 规则条目
// ============================================================================

/// 编译后的规则及其状态存储
pub(crate) struct RuleEntry<R, S> {
    pub(crate) rule: R,
    pub(crate) matcher: HostMatcher,
    pub(crate) states: StateStore<S>,
}

impl<R, S> RuleEntry<R, S> {
    pub(crate) fn compile(pattern: &HostPattern, rule: R) -> Result<Self, ReqGateError> {
        Ok(Self {
            rule,
            matcher: pattern.compile()?,
            states: StateStore::new(),
        })
    }
}

/// 第一个匹配主机的规则
pub(crate) fn first_match<'a, R, S>(
    entries: &'a [RuleEntry<R, S>],
    host: &str,
) -> Option<&'a RuleEntry<R, S>> {
    let found = entries.iter().find(|entry| entry.matcher.matches(host));
    if found.is_none() {
        trace!("No rule matched host {}", host);
    }
    found
}

pub(crate) fn evict_all<R, S>(entries: &[RuleEntry<R, S>], key: &LimiterKey) -> usize {
    entries
        .iter()
        .filter(|entry| entry.states.evict(key).is_some())
        .count()
}

pub(crate) fn count_states<R, S>(entries: &[RuleEntry<R, S>]) -> usize {
    entries.iter().map(|entry| entry.states.len()).sum()
}

/// 在请求截止时间内等待
///
/// 请求没有截止时间时无限等待。
pub(crate) async fn wait_for<F: Future>(req: &Request, fut: F) -> Result<F::Output, ReqGateError> {
    match req.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| ReqGateError::Timeout(req.timeout_duration().unwrap_or_default())),
        None => Ok(fut.await),
    }
}

// ============================================================================
// 准入结果
// ============================================================================

/// 准入许可
///
/// 许可在下一个处理器返回之后才释放。
pub enum Permit {
    /// 无需释放的许可
    Free,
    /// 延迟锁（释放时记录请求时间）
    Delay(DelayPermit),
    /// 并发信号量许可
    Parallelism(OwnedSemaphorePermit),
}

/// 准入决策
pub enum Admission {
    /// 规则匹配并放行
    Proceed(Permit),
    /// 没有规则匹配，原样放行
    PassThrough,
    /// 拒绝
    Reject,
}

// ============================================================================
// 限流策略
// ============================================================================

/// 限流策略
pub enum LimitPolicy {
    Filter(FilterLimiter),
    Delay(DelayLimiter),
    Rate(RateLimiter),
    Parallelism(ParallelismLimiter),
}

impl LimitPolicy {
    /// 策略名称
    pub fn name(&self) -> &'static str {
        match self {
            LimitPolicy::Filter(_) => "filter",
            LimitPolicy::Delay(_) => "delay",
            LimitPolicy::Rate(_) => "rate",
            LimitPolicy::Parallelism(_) => "parallelism",
        }
    }

    /// 准入检查
    ///
    /// 可能在延迟、速率和并发等待上挂起，等待受请求截止时间约束。
    ///
    /// # 返回
    /// - `Ok(Admission)`: 准入决策
    /// - `Err(ReqGateError::Timeout)`: 等待超过请求截止时间
    pub async fn admit(&self, req: &Request) -> Result<Admission, ReqGateError> {
        let Some(host) = req.host() else {
            return Ok(Admission::PassThrough);
        };

        match self {
            LimitPolicy::Filter(filter) => Ok(if filter.is_allowed(&host) {
                Admission::Proceed(Permit::Free)
            } else {
                Admission::Reject
            }),
            LimitPolicy::Delay(delay) => Ok(match delay.acquire(req, &host).await? {
                Some(permit) => Admission::Proceed(Permit::Delay(permit)),
                None => Admission::PassThrough,
            }),
            LimitPolicy::Rate(rate) => Ok(if rate.acquire(req, &host).await? {
                Admission::Proceed(Permit::Free)
            } else {
                Admission::PassThrough
            }),
            LimitPolicy::Parallelism(parallelism) => {
                Ok(match parallelism.acquire(req, &host).await? {
                    Some(permit) => Admission::Proceed(Permit::Parallelism(permit)),
                    None => Admission::PassThrough,
                })
            }
        }
    }

    /// 移除某个键的状态，返回移除的状态数
    pub fn evict(&self, key: &LimiterKey) -> usize {
        match self {
            LimitPolicy::Filter(_) => 0,
            LimitPolicy::Delay(delay) => delay.evict(key),
            LimitPolicy::Rate(rate) => rate.evict(key),
            LimitPolicy::Parallelism(parallelism) => parallelism.evict(key),
        }
    }

    /// 当前状态数
    pub fn state_count(&self) -> usize {
        match self {
            LimitPolicy::Filter(_) => 0,
            LimitPolicy::Delay(delay) => delay.state_count(),
            LimitPolicy::Rate(rate) => rate.state_count(),
            LimitPolicy::Parallelism(parallelism) => parallelism.state_count(),
        }
    }

    /// 停止后台任务
    pub fn shutdown(&self) {
        if let LimitPolicy::Rate(rate) = self {
            rate.shutdown();
        }
    }
}

// ============================================================================
// 统计信息
// ============================================================================

/// 限流器统计信息
#[derive(Debug, Default)]
pub struct LimiterStats {
    checked: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    passed_through: AtomicU64,
    timed_out: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStatsSnapshot {
    /// 检查次数
    pub checked: u64,
    /// 规则匹配并放行次数
    pub admitted: u64,
    /// 拒绝次数
    pub rejected: u64,
    /// 无规则匹配放行次数
    pub passed_through: u64,
    /// 等待超时次数
    pub timed_out: u64,
}

impl LimiterStats {
    pub fn snapshot(&self) -> LimiterStatsSnapshot {
        LimiterStatsSnapshot {
            checked: self.checked.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// 限流中间件
// ============================================================================

/// 限流中间件
///
/// 同一个中间件可以多次注册，所有包装出的处理器共享同一份状态。
pub struct LimiterMiddleware {
    policy: Arc<LimitPolicy>,
    stats: Arc<LimiterStats>,
}

impl LimiterMiddleware {
    pub fn new(policy: LimitPolicy) -> Self {
        info!("Limiter middleware created: {}", policy.name());
        Self {
            policy: Arc::new(policy),
            stats: Arc::new(LimiterStats::default()),
        }
    }

    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    /// 统计快照
    pub fn stats(&self) -> LimiterStatsSnapshot {
        self.stats.snapshot()
    }

    /// 外部淘汰钩子：移除某个键的状态
    pub fn evict(&self, key: &LimiterKey) -> usize {
        let removed = self.policy.evict(key);
        debug!("Evicted {} states for key {} from {}", removed, key, self.policy.name());
        removed
    }

    /// 当前状态数
    pub fn state_count(&self) -> usize {
        self.policy.state_count()
    }
}

impl Middleware for LimiterMiddleware {
    fn name(&self) -> &str {
        self.policy.name()
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(LimitedHandler {
            policy: Arc::clone(&self.policy),
            stats: Arc::clone(&self.stats),
            next,
        })
    }

    fn shutdown(&self) {
        self.policy.shutdown();
    }
}

struct LimitedHandler {
    policy: Arc<LimitPolicy>,
    stats: Arc<LimiterStats>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for LimitedHandler {
    async fn handle(&self, mut req: Request) -> Option<Response> {
        // 已失败的请求不做限流
        if req.has_error() {
            return self.next.handle(req).await;
        }

        self.stats.checked.fetch_add(1, Ordering::Relaxed);

        match self.policy.admit(&req).await {
            Ok(Admission::Proceed(permit)) => {
                self.stats.admitted.fetch_add(1, Ordering::Relaxed);
                debug!("Request {} admitted by {}", req, self.policy.name());
                if let Permit::Delay(delay) = &permit {
                    if delay.is_owner() {
                        req.hold_delay(delay.limiter_id(), delay.key().clone());
                    }
                }
                let resp = self.next.handle(req).await;
                drop(permit);
                resp
            }
            Ok(Admission::PassThrough) => {
                self.stats.passed_through.fetch_add(1, Ordering::Relaxed);
                self.next.handle(req).await
            }
            Ok(Admission::Reject) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Request {} rejected by {}", req, self.policy.name());
                None
            }
            Err(e) => {
                if e.is_timeout() {
                    self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                }
                warn!("Request {} failed in {}: {}", req, self.policy.name(), e);
                Some(Response::from_error(&req, e))
            }
        }
    }
}

// ============================================================================
// 构造函数
// ============================================================================

/// 创建过滤中间件
///
/// `whitelist = true` 时未匹配任何规则的请求被拒绝。
pub fn filter_limiter(
    whitelist: bool,
    rules: Vec<FilterRule>,
) -> Result<LimiterMiddleware, ReqGateError> {
    Ok(LimiterMiddleware::new(LimitPolicy::Filter(
        FilterLimiter::new(whitelist, rules)?,
    )))
}

/// 创建延迟中间件
pub fn delay_limiter(
    scope: LimitScope,
    rules: Vec<DelayRule>,
) -> Result<LimiterMiddleware, ReqGateError> {
    Ok(LimiterMiddleware::new(LimitPolicy::Delay(DelayLimiter::new(
        scope, rules,
    )?)))
}

/// 创建速率中间件
///
/// 必须在 tokio 运行时中调用。
pub fn rate_limiter(
    scope: LimitScope,
    rules: Vec<RateRule>,
) -> Result<LimiterMiddleware, ReqGateError> {
    Ok(LimiterMiddleware::new(LimitPolicy::Rate(RateLimiter::new(
        scope, rules,
    )?)))
}

/// 创建并发中间件
pub fn parallelism_limiter(
    scope: LimitScope,
    rules: Vec<ParallelismRule>,
) -> Result<LimiterMiddleware, ReqGateError> {
    Ok(LimiterMiddleware::new(LimitPolicy::Parallelism(
        ParallelismLimiter::new(scope, rules)?,
    )))
}
