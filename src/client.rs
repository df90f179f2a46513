//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 客户端
//!
//! [`Client`] 持有中间件链并提供唯一的执行入口 [`Client::execute`]。
//! 进程级默认客户端支撑 [`execute`] 和 [`Request::send`]。

use crate::config::ClientConfig;
use crate::error::ReqGateError;
use crate::factory::LimiterFactory;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Exchange, HttpExchange};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 客户端统计信息
#[derive(Debug, Default)]
pub struct ClientStats {
    total: AtomicU64,
    succeeded: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// 客户端统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStatsSnapshot {
    /// 执行次数
    pub total: u64,
    /// 无错误完成次数
    pub succeeded: u64,
    /// 被拒绝次数
    pub rejected: u64,
    /// 失败次数（不含拒绝）
    pub failed: u64,
}

impl ClientStats {
    pub fn snapshot(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// HTTP 客户端
pub struct Client {
    chain: RwLock<MiddlewareChain>,
    stats: ClientStats,
}

impl Client {
    /// 使用默认 HTTP 交换创建
    pub fn new() -> Self {
        Self::with_exchange(Arc::new(HttpExchange::default()))
    }

    /// 使用指定交换创建
    pub fn with_exchange(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            chain: RwLock::new(MiddlewareChain::with_exchange(exchange)),
            stats: ClientStats::default(),
        }
    }

    /// 根据配置创建
    ///
    /// 按 filter、delay、rate、parallelism 的顺序安装治理中间件。
    /// 配置了速率规则时必须在 tokio 运行时中调用。
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 配置校验失败
    pub fn from_config(config: &ClientConfig) -> Result<Self, ReqGateError> {
        config.validate().map_err(ReqGateError::ConfigError)?;
        let exchange = HttpExchange::from_config(&config.transport)?;
        Self::from_config_with_exchange(config, Arc::new(exchange))
    }

    /// 根据配置创建，使用指定交换（忽略传输配置）
    pub fn from_config_with_exchange(
        config: &ClientConfig,
        exchange: Arc<dyn Exchange>,
    ) -> Result<Self, ReqGateError> {
        config.validate().map_err(ReqGateError::ConfigError)?;
        let client = Self::with_exchange(exchange);
        client.use_middlewares(LimiterFactory::from_config(&config.governance)?);
        info!(
            "Client created from config with {} middlewares",
            client.middleware_count()
        );
        Ok(client)
    }

    /// 注册中间件
    ///
    /// 先注册的中间件位于外层。同一个中间件注册两次会生效两次。
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) -> &Self {
        self.chain.write().push(middleware);
        self
    }

    /// 批量注册中间件
    pub fn use_middlewares<I>(&self, middlewares: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        let mut chain = self.chain.write();
        for middleware in middlewares {
            chain.push(middleware);
        }
        drop(chain);
        self
    }

    pub fn middleware_count(&self) -> usize {
        self.chain.read().len()
    }

    /// 中间件名称（由外到内）
    pub fn middleware_names(&self) -> Vec<String> {
        self.chain.read().names()
    }

    pub fn stats(&self) -> ClientStatsSnapshot {
        self.stats.snapshot()
    }

    /// 停止所有中间件的后台任务
    pub fn shutdown(&self) {
        info!("Shutting down client middlewares");
        self.chain.read().shutdown();
    }

    /// 执行请求
    ///
    /// 构造失败的请求直接返回 `ReqGateError::Malformed`，不经过中间件链。
    /// 中间件链拒绝时返回 `ReqGateError::Rejected`。无错误的响应会被解码，
    /// 上游已解码的除外。请求设置了回调时，返回前交给回调处理。
    #[instrument(skip(self, req), fields(request_id = %req.id(), target = %req))]
    pub async fn execute(&self, mut req: Request) -> Response {
        let callback = req.take_callback();
        let resp = self.run(req).await;
        match callback {
            Some(callback) => callback(resp),
            None => resp,
        }
    }

    async fn run(&self, mut req: Request) -> Response {
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        if let Some(message) = req.error() {
            let err = ReqGateError::Malformed(message.to_string());
            warn!("Malformed request: {}", err);
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return Response::from_error(&req, err);
        }

        req.arm_deadline();
        let request_id = req.id();
        let url = req.url().cloned();
        // 持有快照，执行期间注册的中间件只影响之后的请求
        let handler = self.chain.read().handler();

        let Some(mut resp) = handler.handle(req).await else {
            debug!("Request rejected by middleware chain");
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Response::orphan(request_id, url, ReqGateError::Rejected);
        };

        if resp.error().is_none() && !resp.is_decoded() {
            if let Err(e) = resp.decode() {
                resp.set_error(e);
            }
        }

        match resp.error() {
            Some(err) => {
                debug!("Request failed: {}", err);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                debug!("Request completed: {:?}", resp.status());
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
            }
        }
        resp
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("middlewares", &self.middleware_names())
            .field("stats", &self.stats())
            .finish()
    }
}

lazy_static::lazy_static! {
    /// 进程级默认客户端
    static ref DEFAULT_CLIENT: Client = Client::new();
}

/// 默认客户端
pub fn default_client() -> &'static Client {
    &DEFAULT_CLIENT
}

/// 使用默认客户端执行请求
pub async fn execute(req: Request) -> Response {
    default_client().execute(req).await
}
