//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, StatusCode, Uri},
    routing::post,
    Router,
};
use darkvisitors_proxy::config::{ProxyConfig, RouteConfig, VisitsConfig};
use darkvisitors_proxy::{HttpServer, Shutdown};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// One POST received by the fake analytics endpoint.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct CapturedVisit {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

/// Start a fake Dark Visitors endpoint at `/visits` that forwards everything
/// it receives to the returned channel.
pub async fn start_visit_endpoint() -> (SocketAddr, mpsc::UnboundedReceiver<CapturedVisit>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let app = Router::new().route(
        "/visits",
        post(move |headers: HeaderMap, body: Bytes| {
            let tx = tx.clone();
            async move {
                let text = |name: header::HeaderName| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                let visit = CapturedVisit {
                    authorization: text(header::AUTHORIZATION),
                    content_type: text(header::CONTENT_TYPE),
                    body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
                };
                let _ = tx.send(visit);
                StatusCode::ACCEPTED
            }
        }),
    );

    (serve(app).await, rx)
}

/// Start an upstream that echoes the request path.
pub async fn start_mock_upstream() -> SocketAddr {
    let app = Router::new().fallback(|uri: Uri| async move { format!("upstream saw {}", uri.path()) });
    serve(app).await
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A running proxy under test.
#[allow(dead_code)]
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
}

#[allow(dead_code)]
impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::with_client(config, client());
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestProxy {
        addr,
        shutdown,
        updates,
    }
}

/// Proxy config with one catch-all route and visit reporting to `endpoint`.
#[allow(dead_code)]
pub fn proxy_config(upstream: SocketAddr, endpoint: SocketAddr, token: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.routes.push(RouteConfig {
        name: "site".into(),
        host: None,
        path_prefix: Some("/".into()),
        upstream: upstream.to_string(),
        priority: 0,
    });
    config.darkvisitors = Some(VisitsConfig {
        endpoint: format!("http://{}/visits", endpoint),
        access_token: token.into(),
    });
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Wait for the next captured visit, failing the test after a few seconds.
#[allow(dead_code)]
pub async fn next_visit(rx: &mut mpsc::UnboundedReceiver<CapturedVisit>) -> CapturedVisit {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no visit reported in time")
        .expect("visit endpoint closed")
}

/// Assert nothing arrives for a short while.
#[allow(dead_code)]
pub async fn assert_no_visit(rx: &mut mpsc::UnboundedReceiver<CapturedVisit>) {
    let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    assert!(result.is_err(), "unexpected visit: {:?}", result);
}
