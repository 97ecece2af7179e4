//! Tower middleware reporting each handled request as a visit.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::Request;
use tower::{Layer, Service};

use crate::visits::event::VisitEvent;
use crate::visits::reporter::VisitReporter;

/// Wraps services with [`DarkVisitors`].
#[derive(Clone, Debug)]
pub struct DarkVisitorsLayer {
    reporter: VisitReporter,
}

impl DarkVisitorsLayer {
    pub fn new(reporter: VisitReporter) -> Self {
        Self { reporter }
    }
}

impl<S> Layer<S> for DarkVisitorsLayer {
    type Service = DarkVisitors<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DarkVisitors {
            inner,
            reporter: self.reporter.clone(),
        }
    }
}

/// Runs the inner service, then reports the request in the background.
///
/// The response is returned as soon as the inner service produces it; the
/// report never delays or alters it. If the inner service fails, the error
/// is passed through and nothing is reported.
#[derive(Clone, Debug)]
pub struct DarkVisitors<S> {
    inner: S,
    reporter: VisitReporter,
}

impl<S, B> Service<Request<B>> for DarkVisitors<S>
where
    S: Service<Request<B>>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        // Snapshot before the request is moved into the chain.
        let visit = self
            .reporter
            .is_enabled()
            .then(|| VisitEvent::from_request(&request));
        let reporter = self.reporter.clone();
        let fut = self.inner.call(request);

        Box::pin(async move {
            let response = fut.await?;
            if let Some(visit) = visit {
                reporter.report(visit);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisitsConfig;
    use axum::body::Body;
    use axum::http::{Response, StatusCode};
    use std::convert::Infallible;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    #[tokio::test]
    async fn test_passthrough_when_disabled() {
        let svc = ServiceBuilder::new()
            .layer(DarkVisitorsLayer::new(VisitReporter::new(None)))
            .service(service_fn(|_req: Request<Body>| async {
                Ok::<_, Infallible>(Response::new(Body::from("ok")))
            }));

        let response = svc
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inner_error_propagates() {
        // Endpoint is unreachable; the point is that the error comes back
        // untouched.
        let reporter = VisitReporter::new(Some(VisitsConfig {
            endpoint: "http://127.0.0.1:1/visits".into(),
            access_token: "t".into(),
        }));
        let svc = ServiceBuilder::new()
            .layer(DarkVisitorsLayer::new(reporter))
            .service(service_fn(|_req: Request<Body>| async {
                Err::<Response<Body>, _>("handler failed")
            }));

        let err = svc
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, "handler failed");
    }
}
