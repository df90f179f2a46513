//! 请求模型
//!
//! [`Request`] 是在中间件链中传递的值对象。构造过程中的任何错误都会记录在请求的
//! 错误槽中，之后的构造步骤不再生效；客户端在执行前检查错误槽并直接失败，
//! 不会对构造失败的请求进行任何网络 I/O。

use crate::client::Client;
use crate::constants::DEFAULT_LOCAL_HOST;
use crate::matchers::host_key;
use crate::response::Response;
use crate::storage::LimiterKey;
use base64::Engine as _;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

/// 补全请求地址
///
/// - `http://` / `https://` 开头：保持不变
/// - `:8080/path`、`/path`：相对本机地址
/// - 其它：补全 `http://` 前缀
pub fn normalize_url(raw: &str) -> String {
    if raw.starts_with("https://") || raw.starts_with("http://") {
        return raw.to_string();
    }
    if raw.starts_with(':') || raw.starts_with('/') {
        return format!("http://{}{}", DEFAULT_LOCAL_HOST, raw);
    }
    format!("http://{}", raw)
}

/// HTTP 请求
#[derive(Clone)]
pub struct Request {
    id: Uuid,
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    err: Option<String>,
    // 本请求已持有的延迟锁：(限流器编号, 键)
    held_delays: Vec<(u64, LimiterKey)>,
    callback: Option<ResponseCallback>,
}

/// 响应回调：在客户端返回响应之前调用
pub type ResponseCallback = Arc<dyn Fn(Response) -> Response + Send + Sync>;

impl Request {
    /// 创建新请求
    pub fn new(method: Method, url: &str) -> Self {
        let (url, err) = match Url::parse(&normalize_url(url)) {
            Ok(url) => (Some(url), None),
            Err(e) => (None, Some(format!("无效的 URL '{}': {}", url, e))),
        };

        Self {
            id: Uuid::new_v4(),
            method,
            url,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: None,
            timeout: None,
            deadline: None,
            err,
            held_delays: Vec::new(),
            callback: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: &str) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: &str) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: &str) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn head(url: &str) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn patch(url: &str) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn options(url: &str) -> Self {
        Self::new(Method::OPTIONS, url)
    }

    // ========================================================================
    // 构造步骤
    // ========================================================================

    /// 追加请求头
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if self.err.is_some() {
            return self;
        }
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => return self.fail(format!("无效的请求头名称 '{}': {}", key, e)),
        };
        let value = match HeaderValue::from_str(value) {
            Ok(value) => value,
            Err(e) => return self.fail(format!("无效的请求头值 '{}': {}", key, e)),
        };
        self.headers.append(name, value);
        self
    }

    /// 批量追加请求头
    pub fn add_headers<'a, I>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .fold(self, |req, (key, value)| req.header(key, value))
    }

    /// 设置 User-Agent
    pub fn user_agent(mut self, ua: &str) -> Self {
        if self.err.is_some() {
            return self;
        }
        match HeaderValue::from_str(ua) {
            Ok(value) => {
                self.headers.insert(header::USER_AGENT, value);
                self
            }
            Err(e) => self.fail(format!("无效的 User-Agent: {}", e)),
        }
    }

    /// 追加查询参数
    pub fn query(mut self, key: &str, value: &str) -> Self {
        if self.err.is_some() {
            return self;
        }
        if let Some(url) = self.url.as_mut() {
            url.query_pairs_mut().append_pair(key, value);
        }
        self
    }

    /// 批量追加查询参数
    pub fn queries<'a, I>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        params
            .into_iter()
            .fold(self, |req, (key, value)| req.query(key, value))
    }

    /// 追加 Cookie
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        if self.err.is_some() {
            return self;
        }
        if name.is_empty() || name.contains(|c: char| c == '=' || c == ';') {
            return self.fail(format!("无效的 Cookie 名称 '{}'", name));
        }
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    /// 设置 Basic 认证
    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        if self.err.is_some() {
            return self;
        }
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        match HeaderValue::from_str(&format!("Basic {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(header::AUTHORIZATION, value);
                self
            }
            Err(e) => self.fail(format!("无效的认证信息: {}", e)),
        }
    }

    /// 设置原始请求体
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        if self.err.is_some() {
            return self;
        }
        self.body = Some(body.into());
        self
    }

    /// 设置 JSON 请求体
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if self.err.is_some() {
            return self;
        }
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.body = Some(body);
                self.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                self
            }
            Err(e) => self.fail(format!("JSON 序列化失败: {}", e)),
        }
    }

    /// 设置表单请求体
    pub fn form<'a, I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.err.is_some() {
            return self;
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.body = Some(encoded.into_bytes());
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self
    }

    /// 设置超时时间
    ///
    /// 超时覆盖整个执行过程：限流器中的等待和网络交换。
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 设置响应回调
    ///
    /// 回调在执行结束时调用，包括请求被拒绝或失败的情况。
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(Response) -> Response + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(f));
        self
    }

    fn fail(mut self, message: String) -> Self {
        self.err = Some(message);
        self
    }

    // ========================================================================
    // 执行
    // ========================================================================

    /// 使用默认客户端执行
    pub async fn send(self) -> Response {
        crate::client::default_client().execute(self).await
    }

    /// 使用指定客户端执行
    pub async fn send_with(self, client: &Client) -> Response {
        client.execute(self).await
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    /// 请求ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 目标地址（构造失败时为 `None`）
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// 主机键（小写，显式端口时带端口）
    pub fn host(&self) -> Option<String> {
        self.url.as_ref().and_then(host_key)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 可变请求头（供中间件修改）
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// `Cookie` 请求头的值
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// 截止时间（由客户端在执行时设定）
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 根据超时时间设定截止时间，已设定时保持不变
    pub(crate) fn arm_deadline(&mut self) {
        if self.deadline.is_none() {
            self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        }
    }

    /// 错误槽
    pub fn error(&self) -> Option<&str> {
        self.err.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.err.is_some()
    }

    /// 标记请求失败（供中间件使用）
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.err = Some(message.into());
    }

    pub(crate) fn take_callback(&mut self) -> Option<ResponseCallback> {
        self.callback.take()
    }

    pub(crate) fn holds_delay(&self, limiter_id: u64, key: &LimiterKey) -> bool {
        self.held_delays
            .iter()
            .any(|(id, held)| *id == limiter_id && held == key)
    }

    pub(crate) fn hold_delay(&mut self, limiter_id: u64, key: LimiterKey) {
        self.held_delays.push((limiter_id, key));
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} {}", self.method, url),
            None => write!(f, "{} <invalid url>", self.method),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 脱敏 cookies 的值
        let cookies: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, _)| format!("{}=***", name))
            .collect();

        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("cookies", &cookies)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("timeout", &self.timeout)
            .field("err", &self.err)
            .finish()
    }
}
