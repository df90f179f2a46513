//! 配置驱动的客户端集成测试

use reqgate::{Client, ClientConfig, MockExchange, ReqGateError, Request};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::time::Instant;

const GOVERNANCE_YAML: &str = r#"
governance:
  filter:
    rules:
      - glob: "*.ads.com"
        allow: false
  delay:
    scope: per_host
    rules:
      - glob: "*"
        delay: 1s
  rate:
    rules:
      - glob: "*"
        rate: 100
  parallelism:
    scope: per_host
    rules:
      - glob: "*"
        parallelism: 2
"#;

#[tokio::test(start_paused = true)]
async fn test_client_from_yaml_installs_chain_in_order() {
    let config = ClientConfig::from_yaml_str(GOVERNANCE_YAML).unwrap();
    let mock = Arc::new(MockExchange::new());
    let client = Client::from_config_with_exchange(&config, mock.clone()).unwrap();

    assert_eq!(
        client.middleware_names(),
        vec!["filter", "delay", "rate", "parallelism"]
    );

    assert!(client
        .execute(Request::get("http://banner.ads.com/x.js"))
        .await
        .is_rejected());
    assert_eq!(mock.calls(), 0);

    let start = Instant::now();
    assert!(client.execute(Request::get("http://a.com/1")).await.is_success());
    assert!(client.execute(Request::get("http://a.com/2")).await.is_success());
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(mock.calls(), 2);

    client.shutdown();
}

#[tokio::test]
async fn test_client_from_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[governance.filter]
whitelist = true

[[governance.filter.rules]]
glob = "docs.rs"
"#
    )
    .unwrap();

    let config = ClientConfig::from_file(file.path()).unwrap();
    let mock = Arc::new(MockExchange::new());
    let client = Client::from_config_with_exchange(&config, mock.clone()).unwrap();

    assert!(client.execute(Request::get("https://docs.rs/")).await.is_success());
    assert!(client.execute(Request::get("https://crates.io/")).await.is_rejected());
    assert_eq!(mock.calls(), 1);
}

#[test]
fn test_invalid_configs_are_rejected() {
    let cases = [
        // 速率为 0
        "governance:\n  rate:\n    rules:\n      - glob: \"*\"\n        rate: 0\n",
        // 并发为 0
        "governance:\n  parallelism:\n    rules:\n      - glob: \"*\"\n        parallelism: 0\n",
        // 缺少匹配模式
        "governance:\n  delay:\n    rules:\n      - delay: 1s\n",
        // 无效正则
        "governance:\n  filter:\n    rules:\n      - regexp: \"(unclosed\"\n",
        // 空规则列表
        "governance:\n  rate:\n    rules: []\n",
    ];

    for yaml in cases {
        let result = ClientConfig::from_yaml_str(yaml)
            .and_then(|config| Client::from_config_with_exchange(&config, Arc::new(MockExchange::new())));
        assert!(
            matches!(result, Err(ReqGateError::ConfigError(_))),
            "config should be rejected: {}",
            yaml
        );
    }
}

#[test]
fn test_unknown_extension_rejected() {
    let file = NamedTempFile::new().unwrap();
    assert!(matches!(
        ClientConfig::from_file(file.path()),
        Err(ReqGateError::ConfigError(_))
    ));
}

#[test]
fn test_malformed_yaml_is_yaml_error() {
    assert!(matches!(
        ClientConfig::from_yaml_str("governance: [unclosed"),
        Err(ReqGateError::YamlError(_))
    ));
}
