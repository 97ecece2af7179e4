//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the middleware pipeline around the forwarding service
//! - Bind server to listener, shut down gracefully
//! - Apply config reloads to routes and visit reporting
//!
//! # Pipeline (outer → inner)
//! ```text
//! TraceLayer → note generated request id → SetRequestId
//!     → PropagateRequestId → Timeout
//!     → HandleError (ForwardError → 502)
//!     → DarkVisitors (report after success)
//!     → ForwardService (route match, upstream call)
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    error_handling::HandleErrorLayer,
    extract::Request,
    http::HeaderName,
    middleware, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::forward::{handle_forward_error, ForwardService};
use crate::routing::Router as ProxyRouter;
use crate::visits::{DarkVisitorsLayer, HostAddedHeaders, VisitReporter};

const REQUEST_ID: &str = "x-request-id";

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    routes: Arc<ArcSwap<ProxyRouter>>,
    reporter: VisitReporter,
}

impl HttpServer {
    /// Create a new HTTP server. `config.darkvisitors` must be provisioned.
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Like [`HttpServer::new`], delivering visits through `client`.
    pub fn with_client(config: ProxyConfig, client: reqwest::Client) -> Self {
        let routes = Arc::new(ArcSwap::from_pointee(ProxyRouter::from_config(
            config.routes.clone(),
        )));
        let reporter = VisitReporter::with_client(client, config.darkvisitors.clone());

        let router = Self::build_router(&config, ForwardService::new(routes.clone()), reporter.clone());
        Self {
            router,
            config,
            routes,
            reporter,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, forward: ForwardService, reporter: VisitReporter) -> Router {
        let pipeline = ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_forward_error))
            .layer(DarkVisitorsLayer::new(reporter))
            .service(forward);

        Router::new()
            .fallback_service(pipeline)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(middleware::map_request(note_generated_request_id))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, applying config updates as
    /// they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            visits_enabled = self.reporter.is_enabled(),
            "HTTP server starting"
        );

        let routes = self.routes.clone();
        let reporter = self.reporter.clone();
        let bind_address = self.config.listener.bind_address.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_reload(&routes, &reporter, &bind_address, new_config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn reporter(&self) -> &VisitReporter {
        &self.reporter
    }
}

/// Runs just outside `SetRequestIdLayer`: a request arriving without an id
/// is about to get one from the proxy, which is not something the client sent.
async fn note_generated_request_id(mut request: Request) -> Request {
    if !request.headers().contains_key(REQUEST_ID) {
        let mut added = request
            .extensions()
            .get::<HostAddedHeaders>()
            .cloned()
            .unwrap_or_default();
        added.0.push(HeaderName::from_static(REQUEST_ID));
        request.extensions_mut().insert(added);
    }
    request
}

fn apply_reload(
    routes: &ArcSwap<ProxyRouter>,
    reporter: &VisitReporter,
    bind_address: &str,
    config: ProxyConfig,
) {
    if config.listener.bind_address != bind_address {
        tracing::warn!(
            current = %bind_address,
            requested = %config.listener.bind_address,
            "Listener address changes need a restart"
        );
    }

    let router = ProxyRouter::from_config(config.routes);
    let route_count = router.len();
    routes.store(Arc::new(router));

    match &config.darkvisitors {
        Some(visits) => tracing::info!(endpoint = %visits.endpoint, "Visit reporting updated"),
        None => tracing::info!("Visit reporting disabled"),
    }
    reporter.reload(config.darkvisitors);

    tracing::info!(routes = route_count, "Configuration reloaded");
}
