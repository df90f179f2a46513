//! 传输层
//!
//! 中间件链的终端是一次网络交换。[`Exchange`] 抽象了这次交换：
//! - [`HttpExchange`]: 基于 reqwest 的真实 HTTP 交换
//! - [`MockExchange`]: 进程内交换，用于测试和压测
//!
//! 交换永远不会 panic，所有错误都写入响应的错误槽。

use crate::constants::{DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT};
use crate::error::ReqGateError;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// 网络交换
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 执行一次请求/响应交换
    async fn exchange(&self, req: Request) -> Response;
}

// ============================================================================
// 传输配置
// ============================================================================

/// 传输配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 单次请求超时
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// 建立连接超时
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// 最大重定向次数
    pub max_redirects: usize,
    /// 默认 User-Agent（请求未设置时使用）
    pub user_agent: String,
    /// 代理地址
    pub proxy: Option<String>,
    /// 是否启用 Cookie 存储
    pub cookie_store: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            cookie_store: true,
        }
    }
}

impl TransportConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.user_agent.is_empty() {
            return Err("user_agent 不能为空".to_string());
        }
        if HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(format!("无效的 user_agent: {}", self.user_agent));
        }
        if matches!(self.timeout, Some(t) if t.is_zero()) {
            return Err("timeout 必须大于 0".to_string());
        }
        if let Some(proxy) = &self.proxy {
            Url::parse(proxy).map_err(|e| format!("无效的代理地址 '{}': {}", proxy, e))?;
        }
        Ok(())
    }
}

// ============================================================================
// HTTP 交换
// ============================================================================

/// 基于 reqwest 的 HTTP 交换
pub struct HttpExchange {
    client: reqwest::Client,
    user_agent: HeaderValue,
    timeout: Option<Duration>,
}

impl HttpExchange {
    /// 根据配置构建
    ///
    /// # 返回
    /// - `Err(ReqGateError::ConfigError)`: 代理地址或 User-Agent 无效，或客户端构建失败
    pub fn from_config(config: &TransportConfig) -> Result<Self, ReqGateError> {
        config.validate().map_err(ReqGateError::ConfigError)?;

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ReqGateError::ConfigError(format!("无效的 user_agent: {}", e)))?;

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookie_store);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| ReqGateError::ConfigError(format!("无效的代理地址: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ReqGateError::ConfigError(format!("HTTP 客户端构建失败: {}", e)))?;

        debug!(
            "HttpExchange created: timeout={:?}, max_redirects={}",
            config.timeout, config.max_redirects
        );

        Ok(Self {
            client,
            user_agent,
            timeout: config.timeout,
        })
    }

    /// 使用现有的 reqwest 客户端
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
            timeout: None,
        }
    }

    fn map_error(&self, req: &Request, err: reqwest::Error) -> ReqGateError {
        if err.is_timeout() {
            ReqGateError::Timeout(req.timeout_duration().or(self.timeout).unwrap_or_default())
        } else {
            ReqGateError::transport(err)
        }
    }
}

impl Default for HttpExchange {
    /// 使用默认传输配置（启用 Cookie 存储）
    fn default() -> Self {
        Self::from_config(&TransportConfig::default()).unwrap_or_else(|e| {
            warn!("Default HTTP exchange unavailable, using bare client: {}", e);
            Self::with_client(reqwest::Client::new())
        })
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn exchange(&self, req: Request) -> Response {
        let Some(url) = req.url().cloned() else {
            return Response::from_error(
                &req,
                ReqGateError::Malformed("缺少目标地址".to_string()),
            );
        };

        let mut builder = self
            .client
            .request(req.method().clone(), url)
            .headers(req.headers().clone());

        if !req.headers().contains_key(header::USER_AGENT) {
            builder = builder.header(header::USER_AGENT, self.user_agent.clone());
        }
        if let Some(cookie) = req.cookie_header() {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(body) = req.body_bytes() {
            builder = builder.body(body.to_vec());
        }
        if let Some(deadline) = req.deadline() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Request {} deadline passed before exchange", req.id());
                return Response::from_error(
                    &req,
                    ReqGateError::Timeout(req.timeout_duration().unwrap_or_default()),
                );
            }
            builder = builder.timeout(remaining);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Exchange failed for {}: {}", req, e);
                return Response::from_error(&req, self.map_error(&req, e));
            }
        };

        let status = resp.status();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();

        match resp.bytes().await {
            Ok(body) => {
                debug!("Exchanged {} -> {}", req, status);
                Response::new(&req)
                    .with_url(final_url)
                    .with_status(status)
                    .with_headers(headers)
                    .with_body(body.to_vec())
            }
            Err(e) => {
                let mut partial = Response::new(&req)
                    .with_url(final_url)
                    .with_status(status)
                    .with_headers(headers);
                partial.set_error(self.map_error(&req, e));
                partial
            }
        }
    }
}

// ============================================================================
// 进程内交换
// ============================================================================

/// 一次模拟交换的记录
#[derive(Debug, Clone)]
pub struct MockCall {
    /// 主机键
    pub host: Option<String>,
    /// 请求地址
    pub url: Option<Url>,
    /// 交换开始时间
    pub started_at: Instant,
}

/// 进程内交换
///
/// 返回固定的状态码和响应体，可配置延迟。记录调用次数、调用日志以及
/// 同时进行中的最大调用数。
pub struct MockExchange {
    latency: Duration,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    calls: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<MockCall>>,
}

impl MockExchange {
    /// 创建返回 `200 OK` 空文本的交换
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            latency: Duration::ZERO,
            status: StatusCode::OK,
            headers,
            body: Vec::new(),
            calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// 已完成或进行中的调用总数
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// 当前进行中的调用数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 同时进行中的最大调用数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 调用日志（按开始顺序）
    pub fn call_log(&self) -> Vec<MockCall> {
        self.log.lock().clone()
    }

    /// 清空计数和日志
    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.max_in_flight.store(0, Ordering::SeqCst);
        self.log.lock().clear();
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn exchange(&self, req: Request) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.log.lock().push(MockCall {
            host: req.host(),
            url: req.url().cloned(),
            started_at: Instant::now(),
        });

        if !self.latency.is_zero() {
            let sleep = tokio::time::sleep(self.latency);
            match req.deadline() {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, sleep).await.is_err() {
                        return Response::from_error(
                            &req,
                            ReqGateError::Timeout(req.timeout_duration().unwrap_or_default()),
                        );
                    }
                }
                None => sleep.await,
            }
        }

        Response::new(&req)
            .with_status(self.status)
            .with_headers(self.headers.clone())
            .with_body(self.body.clone())
    }
}
