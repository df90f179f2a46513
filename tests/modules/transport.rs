//! HTTP 交换集成测试（本地 wiremock 服务）

use reqgate::{
    debug_logger, random_user_agent, referer_filler, Client, ClientConfig, ReqGateError, Request,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_decodes_text_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<h1>你好</h1>", "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new();
    let resp = client
        .execute(Request::get(&format!("{}/hello", server.uri())))
        .await;

    assert!(resp.is_success());
    assert!(resp.is_html());
    assert_eq!(resp.status().map(|s| s.as_u16()), Some(200));
    assert_eq!(resp.text(), "<h1>你好</h1>");
}

#[tokio::test]
async fn test_headers_query_cookie_and_auth_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust lang"))
        .and(query_param("page", "2"))
        .and(header("x-trace", "abc"))
        .and(header("user-agent", "crawler/1.0"))
        .and(header("cookie", "session=s1; theme=dark"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resp = Request::get(&format!("{}/search", server.uri()))
        .header("x-trace", "abc")
        .user_agent("crawler/1.0")
        .queries([("q", "rust lang"), ("page", "2")])
        .cookie("session", "s1")
        .cookie("theme", "dark")
        .basic_auth("user", "pass")
        .send_with(&Client::new())
        .await;

    assert!(resp.is_success(), "unexpected response: {:?}", resp);
    assert_eq!(resp.status().map(|s| s.as_u16()), Some(204));
}

#[tokio::test]
async fn test_post_json_round_trip() {
    #[derive(Deserialize)]
    struct Created {
        id: u64,
        name: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"name": "widget"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 7, "name": "widget"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resp = Client::new()
        .execute(
            Request::post(&format!("{}/items", server.uri()))
                .json(&serde_json::json!({"name": "widget"})),
        )
        .await;

    assert!(resp.is_json());
    let created: Created = resp.into_json().unwrap();
    assert_eq!(created.id, 7);
    assert_eq!(created.name, "widget");
}

#[tokio::test]
async fn test_request_timeout_maps_to_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let timeout = Duration::from_millis(200);
    let resp = Client::new()
        .execute(Request::get(&server.uri()).timeout(timeout))
        .await;

    match resp.error() {
        Some(ReqGateError::Timeout(d)) => assert_eq!(*d, timeout),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_timeout_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = ClientConfig::from_yaml_str("transport:\n  timeout: 200ms\n").unwrap();
    let client = Client::from_config(&config).unwrap();
    let resp = client.execute(Request::get(&server.uri())).await;

    assert!(resp.error().is_some_and(ReqGateError::is_timeout));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let resp = Client::new().execute(Request::get("http://127.0.0.1:1/")).await;
    assert!(matches!(resp.error(), Some(ReqGateError::Transport(_))));
    assert!(resp.status().is_none());
}

#[tokio::test]
async fn test_non_success_status_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let resp = Client::new().execute(Request::get(&server.uri())).await;
    assert!(resp.error().is_none());
    assert!(!resp.is_success());
    assert_eq!(resp.into_text().unwrap(), "missing");
}

#[tokio::test]
async fn test_default_client_keeps_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/set"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=42; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .and(header("cookie", "sid=42"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = Client::new();
    let resp = client
        .execute(Request::get(&format!("{}/set", server.uri())))
        .await;
    assert!(resp.is_success());

    let resp = client
        .execute(Request::get(&format!("{}/check", server.uri())))
        .await;
    assert_eq!(resp.status().map(|s| s.as_u16()), Some(200));
}

#[tokio::test]
async fn test_builtin_middlewares_shape_request() {
    let server = MockServer::start().await;
    let origin = format!("{}/", server.uri());
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("referer", origin.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = Client::new();
    client
        .use_middleware(Arc::new(debug_logger()))
        .use_middleware(Arc::new(random_user_agent()))
        .use_middleware(Arc::new(referer_filler()));

    for _ in 0..2 {
        let resp = client
            .execute(Request::get(&format!("{}/page", server.uri())))
            .await;
        assert!(resp.is_success(), "unexpected response: {:?}", resp);
    }

    let received = server.received_requests().await.unwrap();
    for request in received {
        let ua = request.headers.get("user-agent").unwrap().to_str().unwrap();
        assert!(ua.starts_with("Mozilla/5.0"), "unexpected user agent {}", ua);
    }
}
