//! 端到端测试：按配置治理的抓取任务
//!
//! 测试场景：
//! 1. 从 YAML 构建完整治理链（filter → delay → rate → parallelism）
//! 2. 并发抓取三个站点的页面，夹带广告域名
//! 3. 广告请求被拒绝，不产生任何交换
//! 4. 同一站点的相邻请求间隔不小于 延迟 + 响应时间
//! 5. 同时进行的交换数不超过全局并发上限

use crate::common::{call_gaps, calls_to, execute_concurrently, init_test_tracing, urls_for};
use reqgate::{Client, ClientConfig, MockExchange};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const CRAWL_CONFIG: &str = r#"
governance:
  filter:
    whitelist: false
    rules:
      - glob: "*.ads.com"
        allow: false
      - regexp: "^tracker\\."
        allow: false
  delay:
    scope: per_host
    rules:
      - glob: "*"
        delay: 500ms
  rate:
    scope: per_host
    rules:
      - glob: "*"
        rate: 10
  parallelism:
    scope: global
    rules:
      - glob: "*"
        parallelism: 2
"#;

#[tokio::test(start_paused = true)]
async fn test_e2e_governed_crawl() {
    init_test_tracing();

    let latency = Duration::from_millis(100);
    let delay = Duration::from_millis(500);
    let config = ClientConfig::from_yaml_str(CRAWL_CONFIG).unwrap();
    let mock = Arc::new(MockExchange::new().with_latency(latency).with_body("<html></html>"));
    let client = Arc::new(Client::from_config_with_exchange(&config, mock.clone()).unwrap());

    // Step 1: 组装待抓取地址
    let sites = ["blog.example.com", "docs.example.com", "shop.example.com"];
    let mut urls = Vec::new();
    for site in sites {
        urls.extend(urls_for(site, 3));
    }
    urls.extend(urls_for("banner.ads.com", 2));
    urls.extend(urls_for("tracker.example.org", 1));

    // Step 2: 并发执行
    let start = Instant::now();
    let responses = execute_concurrently(&client, &urls).await;
    let elapsed = start.elapsed();

    // Step 3: 广告与追踪请求被拒绝
    let rejected = responses.iter().filter(|r| r.is_rejected()).count();
    let succeeded = responses.iter().filter(|r| r.is_success()).count();
    assert_eq!(rejected, 3);
    assert_eq!(succeeded, 9);
    assert_eq!(mock.calls(), 9);

    // Step 4: 同一站点的请求被串行化并保持间隔
    let log = mock.call_log();
    for site in sites {
        let calls = calls_to(&log, site);
        assert_eq!(calls.len(), 3, "site {} should be fetched 3 times", site);
        for gap in call_gaps(&calls) {
            assert!(gap >= delay + latency, "site {} gap {:?}", site, gap);
        }
    }
    assert!(elapsed >= (delay + latency) * 2);

    // Step 5: 全局并发上限
    assert!(mock.max_in_flight() <= 2);

    let stats = client.stats();
    assert_eq!(stats.total, 12);
    assert_eq!(stats.rejected, 3);
    assert_eq!(stats.succeeded, 9);
    assert_eq!(stats.failed, 0);

    client.shutdown();
}

/// 超时覆盖限流等待：积压的请求按各自期限失败，而不是无限等待
#[tokio::test(start_paused = true)]
async fn test_e2e_backlog_times_out() {
    let config = ClientConfig::from_yaml_str(
        r#"
governance:
  delay:
    rules:
      - glob: "*"
        delay: 1s
"#,
    )
    .unwrap();
    let mock = Arc::new(MockExchange::new());
    let client = Arc::new(Client::from_config_with_exchange(&config, mock.clone()).unwrap());

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .execute(
                        reqgate::Request::get(&format!("http://a.com/{}", i))
                            .timeout(Duration::from_millis(2500)),
                    )
                    .await
            })
        })
        .collect();

    let mut timed_out = 0;
    for handle in handles {
        let resp = handle.await.unwrap();
        if resp.error().is_some_and(|e| e.is_timeout()) {
            timed_out += 1;
        }
    }

    // 0s、1s、2s 可以完成，剩余两个超过 2.5s 的期限
    assert_eq!(mock.calls(), 3);
    assert_eq!(timed_out, 2);
}
