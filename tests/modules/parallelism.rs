//! 并发限流器集成测试

use crate::common::{calls_to, create_mock_client, execute_concurrently, urls_for};
use reqgate::limiters::ParallelismRule;
use reqgate::{middleware_fn, parallelism_limiter, HostPattern, LimitScope, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 同时进行的请求不超过 P，总耗时不少于 ceil(N/P)·T
#[tokio::test(start_paused = true)]
async fn test_caps_overlap_and_span() {
    let latency = Duration::from_secs(1);
    let (client, mock) = create_mock_client(latency);
    client.use_middleware(Arc::new(
        parallelism_limiter(
            LimitScope::Global,
            vec![ParallelismRule::new(HostPattern::any(), 3)],
        )
        .unwrap(),
    ));

    let start = Instant::now();
    let responses = execute_concurrently(&client, &urls_for("a.com", 10)).await;

    assert!(responses.iter().all(|r| r.is_success()));
    assert!(mock.max_in_flight() <= 3);
    assert!(start.elapsed() >= latency * 4);
}

/// 按主机作用域下每个主机拥有独立的并发上限
#[tokio::test(start_paused = true)]
async fn test_per_host_caps() {
    let latency = Duration::from_secs(1);
    let (client, mock) = create_mock_client(latency);
    client.use_middleware(Arc::new(
        parallelism_limiter(
            LimitScope::PerHost,
            vec![ParallelismRule::new(HostPattern::any(), 1)],
        )
        .unwrap(),
    ));

    let start = Instant::now();
    let mut urls = urls_for("a.com", 2);
    urls.extend(urls_for("b.com", 2));
    execute_concurrently(&client, &urls).await;

    assert_eq!(mock.max_in_flight(), 2);
    assert!(start.elapsed() >= latency * 2);
    assert!(start.elapsed() < latency * 3);

    let log = mock.call_log();
    for host in ["a.com", "b.com"] {
        let calls = calls_to(&log, host);
        assert!(calls[1].started_at - calls[0].started_at >= latency);
    }
}

/// 下游 panic 时许可同样被释放
#[tokio::test]
async fn test_permit_released_on_downstream_panic() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        parallelism_limiter(
            LimitScope::Global,
            vec![ParallelismRule::new(HostPattern::any(), 1)],
        )
        .unwrap(),
    ));
    client.use_middleware(middleware_fn("explode", |req, next| async move {
        if req.url().is_some_and(|u| u.path() == "/panic") {
            panic!("downstream failure");
        }
        next.handle(req).await
    }));

    let panicking = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.execute(Request::get("http://a.com/panic")).await }
    });
    assert!(panicking.await.is_err());

    let resp = tokio::time::timeout(
        Duration::from_secs(1),
        client.execute(Request::get("http://a.com/ok")),
    )
    .await
    .expect("permit was not released");
    assert!(resp.is_success());
    assert_eq!(mock.calls(), 1);
}
