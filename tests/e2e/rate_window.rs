//! 端到端测试：固定窗口速率限制
//!
//! 测试场景：
//! 1. rate=2 全局作用域，t=0 并发发起 5 个请求
//! 2. 恰好 2 个在 t=1s 之前完成，其余 3 个在 [1s, 2s] 内完成
//! 3. 窗口边界两侧可以各消耗一个完整窗口的令牌

use crate::common::{create_mock_client, execute_concurrently, urls_for};
use reqgate::limiters::RateRule;
use reqgate::{rate_limiter, HostPattern, LimitScope, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_e2e_rate_window_distribution() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        rate_limiter(LimitScope::Global, vec![RateRule::new(HostPattern::any(), 2)]).unwrap(),
    ));

    let start = Instant::now();
    let responses = execute_concurrently(&client, &urls_for("a.com", 5)).await;
    assert!(responses.iter().all(|r| r.is_success()));

    let offsets: Vec<Duration> = mock
        .call_log()
        .iter()
        .map(|call| call.started_at - start)
        .collect();
    assert_eq!(offsets.len(), 5);

    let second = Duration::from_secs(1);
    let first_window = offsets.iter().filter(|t| **t < second).count();
    assert_eq!(first_window, 2, "offsets: {:?}", offsets);
    assert!(offsets
        .iter()
        .filter(|t| **t >= second)
        .all(|t| *t <= second * 2));

    println!("✓ 5 requests spread over windows: {:?}", offsets);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_burst_across_window_edge() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        rate_limiter(LimitScope::Global, vec![RateRule::new(HostPattern::any(), 2)]).unwrap(),
    ));
    let start = Instant::now();

    // Step 1: 窗口末尾消耗完令牌
    tokio::time::sleep(Duration::from_millis(900)).await;
    for _ in 0..2 {
        assert!(client.execute(Request::get("http://a.com")).await.is_success());
    }

    // Step 2: 窗口重置后立即再消耗一个窗口
    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..2 {
        assert!(client.execute(Request::get("http://a.com")).await.is_success());
    }

    // 固定窗口允许边界附近出现 2×rate 的突发
    assert_eq!(mock.calls(), 4);
    assert!(start.elapsed() < Duration::from_millis(1001));
}
