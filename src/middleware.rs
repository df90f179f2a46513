//! 中间件链模块
//!
//! 使用装饰器模式把多个中间件组合在终端交换之外。
//!
//! # 特性
//!
//! - 顺序组合：先注册的中间件位于最外层，最先看到请求
//! - 短路逻辑：中间件不调用下一个处理器即可拒绝请求（返回 `None`）
//! - 不去重：同一个中间件注册两次会包装两次

use crate::request::Request;
use crate::response::Response;
use crate::transport::Exchange;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// 请求处理器
///
/// 返回 `None` 表示请求被拒绝，客户端会将其转换为 `ReqGateError::Rejected`。
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request) -> Option<Response>;
}

/// 共享的处理器
pub type BoxHandler = Arc<dyn Handler>;

/// 中间件
///
/// 中间件接收下一个处理器，返回包装后的处理器。
pub trait Middleware: Send + Sync {
    /// 名称（用于日志）
    fn name(&self) -> &str;

    /// 包装下一个处理器
    fn wrap(&self, next: BoxHandler) -> BoxHandler;

    /// 释放后台资源
    fn shutdown(&self) {}
}

// ============================================================================
// 闭包适配
// ============================================================================

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    async fn handle(&self, req: Request) -> Option<Response> {
        (self.0)(req).await
    }
}

/// 使用闭包创建处理器
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

struct FnMiddleware<F> {
    name: String,
    f: Arc<F>,
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, BoxHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        let f = Arc::clone(&self.f);
        handler_fn(move |req| (*f)(req, Arc::clone(&next)))
    }
}

/// 使用闭包创建中间件
///
/// 闭包接收请求和下一个处理器。
///
/// # 示例
/// ```rust
/// use reqgate::middleware::{middleware_fn, Middleware};
///
/// let logging = middleware_fn("logging", |req, next| async move {
///     println!("-> {}", req);
///     next.handle(req).await
/// });
/// assert_eq!(logging.name(), "logging");
/// ```
pub fn middleware_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Middleware>
where
    F: Fn(Request, BoxHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    Arc::new(FnMiddleware {
        name: name.into(),
        f: Arc::new(f),
    })
}

// ============================================================================
// 终端处理器
// ============================================================================

/// 终端处理器：把请求交给网络交换
pub struct TerminalHandler {
    exchange: Arc<dyn Exchange>,
}

impl TerminalHandler {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl Handler for TerminalHandler {
    async fn handle(&self, req: Request) -> Option<Response> {
        Some(self.exchange.exchange(req).await)
    }
}

// ============================================================================
// 中间件链
// ============================================================================

/// 中间件链
///
/// 按注册顺序保存中间件，每次注册后重新组合处理器。
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: BoxHandler,
    composed: BoxHandler,
}

impl MiddlewareChain {
    /// 创建只有终端处理器的链
    pub fn new(terminal: BoxHandler) -> Self {
        Self {
            middlewares: Vec::new(),
            composed: Arc::clone(&terminal),
            terminal,
        }
    }

    /// 使用网络交换作为终端创建链
    pub fn with_exchange(exchange: Arc<dyn Exchange>) -> Self {
        Self::new(Arc::new(TerminalHandler::new(exchange)))
    }

    /// 注册中间件
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        debug!("Registering middleware: {}", middleware.name());
        self.middlewares.push(middleware);
        self.recompose();
    }

    // 倒序包装，第一个注册的中间件最终位于最外层
    fn recompose(&mut self) {
        self.composed = self
            .middlewares
            .iter()
            .rev()
            .fold(Arc::clone(&self.terminal), |next, middleware| {
                middleware.wrap(next)
            });
        debug!(
            "Middleware chain recomposed with {} middlewares",
            self.middlewares.len()
        );
    }

    /// 当前组合后的处理器
    pub fn handler(&self) -> BoxHandler {
        Arc::clone(&self.composed)
    }

    /// 中间件名称（由外到内）
    pub fn names(&self) -> Vec<String> {
        self.middlewares
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// 关闭所有中间件
    pub fn shutdown(&self) {
        for middleware in &self.middlewares {
            middleware.shutdown();
        }
    }
}
