//! 客户端集成测试

use crate::common::create_mock_client;
use reqgate::limiters::{DelayRule, FilterRule, ParallelismRule, RateRule};
use reqgate::{
    delay_limiter, filter_limiter, middleware_fn, parallelism_limiter, rate_limiter, HostPattern,
    LimitScope, ReqGateError, Request, Response,
};
use std::sync::Arc;
use std::time::Duration;

/// 构造失败的请求不经过中间件链
#[tokio::test]
async fn test_malformed_request_bypasses_chain() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    let limiter = Arc::new(filter_limiter(true, vec![]).unwrap());
    client.use_middleware(limiter.clone());

    let resp = client.execute(Request::get("http://[::1")).await;
    assert!(resp.error().is_some_and(ReqGateError::is_malformed));
    assert_eq!(limiter.stats().checked, 0);
    assert_eq!(mock.calls(), 0);
}

/// 默认客户端：构造失败的请求不会产生网络 I/O
#[tokio::test]
async fn test_default_client_rejects_malformed() {
    let resp = reqgate::execute(Request::get("http://a.com").cookie("bad;name", "v")).await;
    assert!(resp.error().is_some_and(ReqGateError::is_malformed));

    let resp = Request::get("http://a.com")
        .header("bad header", "v")
        .send()
        .await;
    assert!(resp.error().is_some_and(ReqGateError::is_malformed));
}

/// 完整治理链的安装顺序：filter、delay、rate、parallelism
#[tokio::test(start_paused = true)]
async fn test_full_governance_chain() {
    let (client, mock) = create_mock_client(Duration::from_millis(100));
    client
        .use_middleware(Arc::new(
            filter_limiter(false, vec![FilterRule::deny(HostPattern::glob("*.ads.com"))]).unwrap(),
        ))
        .use_middleware(Arc::new(
            delay_limiter(
                LimitScope::PerHost,
                vec![DelayRule::new(HostPattern::any(), Duration::from_millis(200))],
            )
            .unwrap(),
        ))
        .use_middleware(Arc::new(
            rate_limiter(LimitScope::PerHost, vec![RateRule::new(HostPattern::any(), 10)])
                .unwrap(),
        ))
        .use_middleware(Arc::new(
            parallelism_limiter(
                LimitScope::PerHost,
                vec![ParallelismRule::new(HostPattern::any(), 2)],
            )
            .unwrap(),
        ));

    assert_eq!(
        client.middleware_names(),
        vec!["filter", "delay", "rate", "parallelism"]
    );

    assert!(client.execute(Request::get("http://x.ads.com")).await.is_rejected());
    assert!(client.execute(Request::get("http://a.com")).await.is_success());
    assert_eq!(mock.calls(), 1);

    let stats = client.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.succeeded, 1);
}

/// 中间件可以修改请求
#[tokio::test]
async fn test_middleware_can_rewrite_request() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(middleware_fn("auth", |mut req, next| async move {
        req.headers_mut()
            .insert("x-token", reqwest::header::HeaderValue::from_static("secret"));
        next.handle(req).await
    }));
    client.use_middleware(middleware_fn("check", |req, next| async move {
        if req.headers().get("x-token").is_none() {
            return Some(Response::from_error(
                &req,
                ReqGateError::Malformed("missing token".to_string()),
            ));
        }
        next.handle(req).await
    }));

    assert!(client.execute(Request::get("http://a.com")).await.is_success());
    assert_eq!(mock.calls(), 1);
}

/// 传输错误保留在响应中
#[tokio::test]
async fn test_transport_error_in_response() {
    let (client, _mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(middleware_fn("offline", |req, _next| async move {
        Some(Response::from_error(
            &req,
            ReqGateError::transport("network unreachable"),
        ))
    }));

    let resp = client.execute(Request::get("http://a.com")).await;
    assert!(matches!(resp.error(), Some(ReqGateError::Transport(_))));
    assert_eq!(client.stats().failed, 1);
    assert!(resp.into_result().is_err());
}

/// 响应回调在返回之前执行，拒绝的请求同样会经过回调
#[tokio::test]
async fn test_response_callback() {
    let (client, _mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        filter_limiter(false, vec![FilterRule::deny(HostPattern::glob("blocked.com"))]).unwrap(),
    ));

    let resp = client
        .execute(Request::get("http://a.com").callback(|resp| resp.with_text("handled")))
        .await;
    assert_eq!(resp.text(), "handled");

    let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&seen);
    let resp = client
        .execute(Request::get("http://blocked.com").callback(move |resp| {
            flag.store(resp.is_rejected(), std::sync::atomic::Ordering::SeqCst);
            resp
        }))
        .await;
    assert!(resp.is_rejected());
    assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
}
