//! 内置中间件
//!
//! 只修改请求或记录日志，然后交给下一个处理器：
//! - [`RandomUserAgent`]: 为每个请求随机选择浏览器 User-Agent
//! - [`RefererFiller`]: 缺少 Referer 时填入目标站点的根地址
//! - [`DebugLogger`]: 记录请求和响应摘要

use crate::constants::BROWSER_USER_AGENTS;
use crate::error::ReqGateError;
use crate::middleware::{BoxHandler, Handler, Middleware};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderValue};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace};

// ============================================================================
// 随机 User-Agent
// ============================================================================

/// 随机 User-Agent 中间件
///
/// 覆盖请求已有的 User-Agent。
pub struct RandomUserAgent {
    agents: Arc<Vec<HeaderValue>>,
}

impl RandomUserAgent {
    /// 使用内置的浏览器 User-Agent 列表
    pub fn new() -> Self {
        Self {
            agents: Arc::new(
                BROWSER_USER_AGENTS
                    .iter()
                    .copied()
                    .map(HeaderValue::from_static)
                    .collect(),
            ),
        }
    }

    /// 使用自定义列表
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 列表为空或包含无效的请求头值
    pub fn with_agents<I, S>(agents: I) -> Result<Self, ReqGateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let agents = agents
            .into_iter()
            .map(|ua| {
                HeaderValue::from_str(ua.as_ref()).map_err(|e| {
                    ReqGateError::ConfigError(format!("无效的 User-Agent '{}': {}", ua.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if agents.is_empty() {
            return Err(ReqGateError::ConfigError(
                "User-Agent 列表不能为空".to_string(),
            ));
        }
        Ok(Self {
            agents: Arc::new(agents),
        })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for RandomUserAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RandomUserAgent {
    fn name(&self) -> &str {
        "random_user_agent"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RandomUserAgentHandler {
            agents: Arc::clone(&self.agents),
            next,
        })
    }
}

struct RandomUserAgentHandler {
    agents: Arc<Vec<HeaderValue>>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for RandomUserAgentHandler {
    async fn handle(&self, mut req: Request) -> Option<Response> {
        let agent = self.agents.choose(&mut rand::thread_rng()).cloned();
        if let Some(agent) = agent {
            trace!("User-Agent for {}: {:?}", req, agent);
            req.headers_mut().insert(header::USER_AGENT, agent);
        }
        self.next.handle(req).await
    }
}

// ============================================================================
// Referer 填充
// ============================================================================

/// Referer 填充中间件
///
/// 请求没有 Referer 时设置为目标地址的源（`scheme://host[:port]/`）。
#[derive(Debug, Default, Clone, Copy)]
pub struct RefererFiller;

impl RefererFiller {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RefererFiller {
    fn name(&self) -> &str {
        "referer_filler"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RefererFillerHandler { next })
    }
}

struct RefererFillerHandler {
    next: BoxHandler,
}

#[async_trait]
impl Handler for RefererFillerHandler {
    async fn handle(&self, mut req: Request) -> Option<Response> {
        if !req.headers().contains_key(header::REFERER) {
            let origin = req
                .url()
                .map(|url| format!("{}/", url.origin().ascii_serialization()));
            if let Some(value) = origin.and_then(|o| HeaderValue::from_str(&o).ok()) {
                req.headers_mut().insert(header::REFERER, value);
            }
        }
        self.next.handle(req).await
    }
}

// ============================================================================
// 调试日志
// ============================================================================

/// 调试日志中间件
///
/// 以 `debug` 级别记录请求方法、地址和请求头，以及响应状态和耗时。
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugLogger;

impl DebugLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for DebugLogger {
    fn name(&self) -> &str {
        "debug"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(DebugLoggerHandler { next })
    }
}

struct DebugLoggerHandler {
    next: BoxHandler,
}

#[async_trait]
impl Handler for DebugLoggerHandler {
    async fn handle(&self, req: Request) -> Option<Response> {
        let request_id = req.id();
        debug!(
            request_id = %request_id,
            headers = ?req.headers(),
            "--> {}",
            req
        );

        let start = Instant::now();
        let resp = self.next.handle(req).await;
        let elapsed = start.elapsed();

        match &resp {
            Some(resp) => match resp.error() {
                Some(err) => debug!(request_id = %request_id, ?elapsed, "<-- error: {}", err),
                None => debug!(
                    request_id = %request_id,
                    ?elapsed,
                    bytes = resp.body().len(),
                    "<-- {:?}",
                    resp.status()
                ),
            },
            None => debug!(request_id = %request_id, ?elapsed, "<-- rejected"),
        }
        resp
    }
}

// ============================================================================
// 构造函数
// ============================================================================

/// 随机 User-Agent 中间件
pub fn random_user_agent() -> RandomUserAgent {
    RandomUserAgent::new()
}

/// Referer 填充中间件
pub fn referer_filler() -> RefererFiller {
    RefererFiller::new()
}

/// 调试日志中间件
pub fn debug_logger() -> DebugLogger {
    DebugLogger::new()
}
