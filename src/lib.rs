//! Reverse proxy that reports visits to the Dark Visitors agent analytics API.
//!
//! The reporting itself is a plain tower middleware, [`DarkVisitorsLayer`],
//! and works in any tower or axum stack:
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use darkvisitors_proxy::{DarkVisitorsLayer, VisitReporter, VisitsConfig};
//! use darkvisitors_proxy::config::placeholders::Replacer;
//!
//! # fn build() -> Result<Router, Box<dyn std::error::Error>> {
//! let config = VisitsConfig::new("{env.DARKVISITORS_TOKEN}").provision(&Replacer::new())?;
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(DarkVisitorsLayer::new(VisitReporter::new(Some(config))));
//! # Ok(app)
//! # }
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod visits;

pub use config::{ProxyConfig, VisitsConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use visits::{DarkVisitorsLayer, VisitEvent, VisitReporter};
