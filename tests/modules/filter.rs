//! 过滤限流器集成测试

use crate::common::create_mock_client;
use reqgate::limiters::FilterRule;
use reqgate::{filter_limiter, HostPattern, Request};
use std::sync::Arc;
use std::time::Duration;

/// 拒绝规则命中时不会到达终端交换
#[tokio::test]
async fn test_deny_rule_never_reaches_exchange() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        filter_limiter(false, vec![FilterRule::deny(HostPattern::glob("*.example.com"))]).unwrap(),
    ));

    let resp = client.execute(Request::get("http://a.example.com/")).await;
    assert!(resp.is_rejected());
    assert_eq!(mock.calls(), 0);

    let resp = client.execute(Request::get("http://other.org/")).await;
    assert!(resp.is_success());
    assert_eq!(mock.calls(), 1);
}

/// 白名单模式下未匹配的主机被拒绝
#[tokio::test]
async fn test_whitelist_denies_unmatched() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        filter_limiter(
            true,
            vec![FilterRule::allow(HostPattern::regex(r"^docs\.rs$"))],
        )
        .unwrap(),
    ));

    assert!(client.execute(Request::get("https://docs.rs/tokio")).await.is_success());
    assert!(client.execute(Request::get("https://crates.io/")).await.is_rejected());
    assert_eq!(mock.calls(), 1);
    assert_eq!(client.stats().rejected, 1);
}

/// 无匹配策略对同一主机的决策是确定的
#[tokio::test]
async fn test_no_match_policy_is_deterministic() {
    let (client, _mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        filter_limiter(true, vec![FilterRule::allow(HostPattern::glob("a.com"))]).unwrap(),
    ));

    for _ in 0..10 {
        assert!(client.execute(Request::get("http://b.com")).await.is_rejected());
    }
}

/// 大小写不影响匹配
#[tokio::test]
async fn test_host_case_is_ignored() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        filter_limiter(false, vec![FilterRule::deny(HostPattern::glob("*.Tracker.NET"))]).unwrap(),
    ));

    assert!(client
        .execute(Request::get("http://CDN.tracker.net/pixel.gif"))
        .await
        .is_rejected());
    assert_eq!(mock.calls(), 0);
}

/// 显式端口是主机键的一部分
#[tokio::test]
async fn test_explicit_port_in_host() {
    let (client, mock) = create_mock_client(Duration::ZERO);
    client.use_middleware(Arc::new(
        filter_limiter(false, vec![FilterRule::deny(HostPattern::glob("127.0.0.1:9*"))]).unwrap(),
    ));

    assert!(client.execute(Request::get(":9000/admin")).await.is_rejected());
    assert!(client.execute(Request::get(":8080/admin")).await.is_success());
    assert_eq!(mock.calls(), 1);
}
