//! 响应模型
//!
//! [`Response`] 携带状态码、响应头、原始响应体、解码后的文本以及错误槽。
//! 解码失败不会丢弃原始响应体。

use crate::error::ReqGateError;
use crate::request::Request;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

/// HTTP 响应
#[derive(Debug)]
pub struct Response {
    request_id: Uuid,
    url: Option<Url>,
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    text: String,
    decoded: bool,
    err: Option<ReqGateError>,
}

impl Response {
    /// 为请求创建空响应
    pub fn new(req: &Request) -> Self {
        Self {
            request_id: req.id(),
            url: req.url().cloned(),
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            text: String::new(),
            decoded: false,
            err: None,
        }
    }

    /// 创建失败响应
    pub fn from_error(req: &Request, err: ReqGateError) -> Self {
        let mut resp = Self::new(req);
        resp.err = Some(err);
        resp
    }

    /// 请求已被消费时，根据请求ID和地址创建失败响应
    pub(crate) fn orphan(request_id: Uuid, url: Option<Url>, err: ReqGateError) -> Self {
        Self {
            request_id,
            url,
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            text: String::new(),
            decoded: false,
            err: Some(err),
        }
    }

    /// 设置最终地址（跟随重定向之后）
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// 设置已解码的文本
    ///
    /// 用于上游（例如缓存）提供已解码的响应，客户端不会再次解码。
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self.decoded = true;
        self
    }

    /// 设置错误
    pub fn set_error(&mut self, err: ReqGateError) {
        self.err = Some(err);
    }

    // ========================================================================
    // 解码
    // ========================================================================

    /// 将响应体解码为文本
    ///
    /// 只处理 `text/*` 和 `*/json`，且字符集缺省或为 UTF-8 的响应。
    /// 其它内容类型保持 `text` 为空。
    ///
    /// # 返回
    /// - `Ok(())`: 解码成功或无需解码
    /// - `Err(ReqGateError::Decode)`: 非 UTF-8 内容或不支持的字符集，原始响应体保持不变
    pub fn decode(&mut self) -> Result<(), ReqGateError> {
        self.decoded = true;
        if self.body.is_empty() {
            return Ok(());
        }

        let content_type = self.content_type();
        if !(content_type.contains("text/") || content_type.contains("/json")) {
            return Ok(());
        }

        match charset_of(&content_type) {
            Some(charset) if charset != "utf-8" && charset != "utf8" => Err(
                ReqGateError::Decode(format!("不支持的字符集: {}", charset)),
            ),
            _ => {
                let text = std::str::from_utf8(&self.body)
                    .map_err(|e| ReqGateError::Decode(format!("响应体不是有效的 UTF-8: {}", e)))?;
                self.text = text.to_string();
                Ok(())
            }
        }
    }

    /// 是否已经解码
    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// 状态码（传输失败时为 `None`）
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 原始响应体
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 解码后的文本
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 错误槽
    pub fn error(&self) -> Option<&ReqGateError> {
        self.err.as_ref()
    }

    /// 是否被拒绝
    pub fn is_rejected(&self) -> bool {
        self.err.as_ref().is_some_and(ReqGateError::is_rejected)
    }

    /// 无错误且状态码为 2xx
    pub fn is_success(&self) -> bool {
        self.err.is_none() && self.status.is_some_and(|s| s.is_success())
    }

    pub fn is_html(&self) -> bool {
        self.content_type().contains("/html")
    }

    pub fn is_json(&self) -> bool {
        self.content_type().contains("/json")
    }

    /// 转换为 `Result`
    pub fn into_result(self) -> Result<Response, ReqGateError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// 取出文本
    pub fn into_text(self) -> Result<String, ReqGateError> {
        self.into_result().map(|resp| resp.text)
    }

    /// 将响应体反序列化为 JSON
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ReqGateError> {
        let resp = self.into_result()?;
        Ok(serde_json::from_slice(&resp.body)?)
    }

    fn content_type(&self) -> String {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase()
    }
}

fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim() == "charset" {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}
