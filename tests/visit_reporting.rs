//! End-to-end visit reporting through the proxy.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get, Router};
use darkvisitors_proxy::config::directive::parse_directive_with_env;
use darkvisitors_proxy::config::placeholders::Replacer;
use darkvisitors_proxy::config::{ProxyConfig, VisitsConfig};
use darkvisitors_proxy::{DarkVisitorsLayer, VisitReporter};

mod common;

#[tokio::test]
async fn test_reports_visit_after_response() {
    let upstream = common::start_mock_upstream().await;
    let (endpoint, mut visits) = common::start_visit_endpoint().await;
    let proxy = common::start_proxy(common::proxy_config(upstream, endpoint, "test-token")).await;

    let res = common::client()
        .get(proxy.url("/blog/hello%20world?ref=feed"))
        .header("User-Agent", "GPTBot/1.2")
        .header("Cookie", "session=secret")
        .header("Accept-Language", "en")
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "upstream saw /blog/hello%20world");

    let visit = common::next_visit(&mut visits).await;
    assert_eq!(visit.authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(visit.content_type.as_deref(), Some("application/json"));
    assert_eq!(visit.body["request_path"], "/blog/hello world");
    assert_eq!(visit.body["request_method"], "GET");

    let headers = visit.body["request_headers"].as_object().unwrap();
    assert_eq!(headers["User-Agent"], serde_json::json!(["GPTBot/1.2"]));
    assert_eq!(headers["Accept-Language"], serde_json::json!(["en"]));
    assert!(!headers.contains_key("Cookie"));
    assert!(!headers.contains_key("Host"));
    // The id the proxy generated is not part of what the client sent.
    assert!(!headers.contains_key("X-Request-Id"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_client_request_id_is_reported() {
    let upstream = common::start_mock_upstream().await;
    let (endpoint, mut visits) = common::start_visit_endpoint().await;
    let proxy = common::start_proxy(common::proxy_config(upstream, endpoint, "t")).await;

    let res = common::client()
        .get(proxy.url("/"))
        .header("X-Request-Id", "client-chosen")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "client-chosen");

    let visit = common::next_visit(&mut visits).await;
    let headers = visit.body["request_headers"].as_object().unwrap();
    assert_eq!(headers["X-Request-Id"], serde_json::json!(["client-chosen"]));
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_failure_sends_no_visit() {
    let (endpoint, mut visits) = common::start_visit_endpoint().await;
    // Nothing listens on port 1.
    let dead_upstream: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let proxy = common::start_proxy(common::proxy_config(dead_upstream, endpoint, "t")).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 502);

    common::assert_no_visit(&mut visits).await;
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unmatched_route_is_still_reported() {
    let upstream = common::start_mock_upstream().await;
    let (endpoint, mut visits) = common::start_visit_endpoint().await;
    let mut config = common::proxy_config(upstream, endpoint, "t");
    config.routes[0].path_prefix = Some("/app".into());
    let proxy = common::start_proxy(config).await;

    let res = common::client().post(proxy.url("/robots.txt")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let visit = common::next_visit(&mut visits).await;
    assert_eq!(visit.body["request_path"], "/robots.txt");
    assert_eq!(visit.body["request_method"], "POST");
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_response_independent_of_endpoint() {
    let upstream = common::start_mock_upstream().await;
    let dead_endpoint: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let proxy = common::start_proxy(common::proxy_config(upstream, dead_endpoint, "t")).await;

    for _ in 0..3 {
        let res = common::client().get(proxy.url("/ok")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_no_visits_without_config() {
    let upstream = common::start_mock_upstream().await;
    let (endpoint, mut visits) = common::start_visit_endpoint().await;
    let mut config = common::proxy_config(upstream, endpoint, "t");
    config.darkvisitors = None;
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    common::assert_no_visit(&mut visits).await;
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_reload_switches_token() {
    let upstream = common::start_mock_upstream().await;
    let (endpoint, mut visits) = common::start_visit_endpoint().await;
    let proxy = common::start_proxy(common::proxy_config(upstream, endpoint, "old-token")).await;

    common::client().get(proxy.url("/a")).send().await.unwrap();
    let visit = common::next_visit(&mut visits).await;
    assert_eq!(visit.authorization.as_deref(), Some("Bearer old-token"));

    let updated: ProxyConfig = common::proxy_config(upstream, endpoint, "new-token");
    proxy.updates.send(updated).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    common::client().get(proxy.url("/b")).send().await.unwrap();
    let visit = common::next_visit(&mut visits).await;
    assert_eq!(visit.authorization.as_deref(), Some("Bearer new-token"));
    assert_eq!(visit.body["request_path"], "/b");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_layer_in_plain_axum_app() {
    let (endpoint, mut visits) = common::start_visit_endpoint().await;

    // Block syntax → provisioned config → layer, the way an embedding app
    // would wire it up.
    let block = "darkvisitors {\n  endpoint {$DV_TEST_ENDPOINT}\n  access_token {$DV_TEST_TOKEN:fallback-token}\n}";
    let endpoint_url = format!("http://{}/visits", endpoint);
    let parsed = parse_directive_with_env(block, |name| {
        (name == "DV_TEST_ENDPOINT").then(|| endpoint_url.clone())
    })
    .unwrap();
    let config: VisitsConfig = parsed.provision(&Replacer::new()).unwrap();
    assert_eq!(config.access_token, "fallback-token");

    let reporter = VisitReporter::with_client(common::client(), Some(config));
    let app = Router::new()
        .route("/hello", get(|| async { "hi" }))
        .layer(DarkVisitorsLayer::new(reporter));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let res = common::client()
        .get(format!("http://{}/hello", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "hi");

    let visit = common::next_visit(&mut visits).await;
    assert_eq!(visit.authorization.as_deref(), Some("Bearer fallback-token"));
    assert_eq!(visit.body["request_path"], "/hello");
}
