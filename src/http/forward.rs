//! Upstream forwarding service.
//!
//! # Responsibilities
//! - Match the request to a route
//! - Rewrite the URI to the route's upstream and forward the request
//! - Report upstream failures as errors, not responses, so middleware in
//!   front can tell a failed chain from a handled request
//!
//! # Design Decisions
//! - No matching route is a handled request (404 response)
//! - Requests always go upstream as HTTP/1.1
//! - Host header preserved

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode, Uri, Version},
    response::IntoResponse,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tower::Service;

use crate::observability::metrics;
use crate::routing::Router;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    Uri(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Innermost service of the pipeline: sends the request to its upstream.
#[derive(Clone)]
pub struct ForwardService {
    routes: Arc<ArcSwap<Router>>,
    client: Client<HttpConnector, Body>,
}

impl ForwardService {
    pub fn new(routes: Arc<ArcSwap<Router>>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { routes, client }
    }
}

impl Service<Request<Body>> for ForwardService {
    type Response = Response<Body>;
    type Error = ForwardError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let routes = self.routes.load_full();
        let client = self.client.clone();
        Box::pin(forward(routes, client, request))
    }
}

async fn forward(
    routes: Arc<Router>,
    client: Client<HttpConnector, Body>,
    request: Request<Body>,
) -> Result<Response<Body>, ForwardError> {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let Some(route) = routes.match_request(request.uri(), request.headers()) else {
        tracing::warn!(path = %request.uri().path(), "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return Ok((StatusCode::NOT_FOUND, "No matching route found").into_response());
    };
    let route_name = route.name.clone();

    let (mut parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    parts.uri = Uri::builder()
        .scheme("http")
        .authority(route.upstream.as_str())
        .path_and_query(path_and_query)
        .build()?;
    parts.version = Version::HTTP_11;

    tracing::debug!(route = %route_name, upstream = %parts.uri, "Forwarding request");

    let response = match client.request(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_request(&method, 502, &route_name, start_time);
            return Err(e.into());
        }
    };

    metrics::record_request(&method, response.status().as_u16(), &route_name, start_time);
    Ok(response.map(Body::new))
}

/// Turn a failed forward into a response for the client.
pub async fn handle_forward_error(err: ForwardError) -> (StatusCode, &'static str) {
    tracing::error!(error = %err, "Upstream error");
    (StatusCode::BAD_GATEWAY, "Upstream request failed")
}
