//! Visit event delivery.
//!
//! # Responsibilities
//! - Serialize a [`VisitEvent`] and POST it to the configured endpoint
//! - Authenticate with `Authorization: Bearer <token>`
//! - Log every failure; never retry, never surface it to the request
//!
//! # Design Decisions
//! - One shared `reqwest::Client`; no timeout beyond the client defaults
//! - Each report is a detached tokio task, unbounded in number
//! - Settings live behind `ArcSwapOption` so reloads apply to new reports
//!   without touching in-flight ones

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::VisitsConfig;
use crate::observability::metrics;
use crate::visits::event::VisitEvent;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("visit reporting is not configured")]
    Disabled,

    #[error("error marshaling visit event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("error creating request: {0}")]
    Build(#[source] reqwest::Error),

    #[error("error sending visit event: {0}")]
    Transport(#[source] reqwest::Error),
}

impl ReportError {
    fn outcome(&self) -> &'static str {
        match self {
            ReportError::Disabled => "disabled",
            ReportError::Serialize(_) => "serialize_error",
            ReportError::Build(_) => "build_error",
            ReportError::Transport(_) => "transport_error",
        }
    }
}

/// Sends visit events to the Dark Visitors API.
///
/// Cheap to clone; clones share the client and the current settings.
#[derive(Clone)]
pub struct VisitReporter {
    client: reqwest::Client,
    config: Arc<ArcSwapOption<VisitsConfig>>,
}

impl VisitReporter {
    /// `config` is expected to be provisioned already.
    pub fn new(config: Option<VisitsConfig>) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: Option<VisitsConfig>) -> Self {
        Self {
            client,
            config: Arc::new(ArcSwapOption::new(config.map(Arc::new))),
        }
    }

    /// Replace the settings used by subsequent reports.
    pub fn reload(&self, config: Option<VisitsConfig>) {
        self.config.store(config.map(Arc::new));
    }

    pub fn is_enabled(&self) -> bool {
        self.config.load().is_some()
    }

    pub fn config(&self) -> Option<Arc<VisitsConfig>> {
        self.config.load_full()
    }

    /// Deliver one event and wait for the endpoint's status.
    pub async fn send(&self, event: &VisitEvent) -> Result<StatusCode, ReportError> {
        let config = self.config.load_full().ok_or(ReportError::Disabled)?;

        let body = event.to_json()?;
        tracing::debug!(
            payload = %String::from_utf8_lossy(&body),
            "Visit event payload constructed"
        );

        let request = self
            .client
            .post(config.endpoint.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", config.access_token))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .build()
            .map_err(ReportError::Build)?;

        // The response is dropped right away, which releases its body.
        let response = self
            .client
            .execute(request)
            .await
            .map_err(ReportError::Transport)?;

        Ok(response.status())
    }

    /// Deliver one event in the background. Nobody needs to await the handle.
    pub fn report(&self, event: VisitEvent) -> JoinHandle<()> {
        let reporter = self.clone();
        tokio::spawn(async move {
            match reporter.send(&event).await {
                Ok(status) => {
                    tracing::debug!(status = status.as_u16(), "Visitor event sent");
                    metrics::record_visit("sent");
                }
                Err(e) => {
                    match &e {
                        ReportError::Disabled => tracing::debug!(error = %e, "Visit event skipped"),
                        ReportError::Transport(_) => tracing::warn!(error = %e, "Error sending visitor event"),
                        ReportError::Serialize(_) | ReportError::Build(_) => {
                            tracing::error!(error = %e, "Visitor event not sent")
                        }
                    }
                    metrics::record_visit(e.outcome());
                }
            }
        })
    }
}

impl std::fmt::Debug for VisitReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitReporter")
            .field("config", &self.config.load_full())
            .finish_non_exhaustive()
    }
}
