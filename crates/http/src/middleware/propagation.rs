//! Trace propagation middleware
//!
//! Continues the trace carried by the incoming `traceparent` (or
//! `X-Amzn-Trace-Id`), runs the request inside an `http_request` span and
//! writes the propagation headers back onto the response:
//!
//! - `traceparent` / `tracestate` for W3C aware callers
//! - `X-Amzn-Trace-Id` for AWS X-Ray
//! - `X-Dl-Request-Id`, derived from the trace id, for everyone else
//!
//! The derived id is also stored in the request extensions as [`RequestId`].

use std::convert::Infallible;
use std::fmt;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use dltrace_core::tracing::propagation::{extract_context, inject_carrier, inject_headers};
use opentelemetry::trace::TraceContextExt;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::error::HttpError;

/// Request id derived from the trace the request belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            HttpError::MissingRequestId("request carries no trace context".to_string())
        })
    }
}

impl<S> OptionalFromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

/// Extension trait for reading the request id from a request
pub trait RequestIdExt {
    /// Get the request id from request extensions
    fn request_id(&self) -> Option<&RequestId>;
}

impl RequestIdExt for Request {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Middleware continuing the incoming trace and propagating it on the response
pub async fn propagation_middleware(mut request: Request, next: Next) -> Response {
    let parent = extract_context(request.headers());

    let span = tracing::info_span!(
        "http_request",
        otel.name = "http_request",
        otel.kind = "server",
        http.method = %request.method(),
        http.path = %request.uri().path(),
        request_id = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
    );
    span.set_parent(parent.clone());

    // Without an OpenTelemetry layer the span has no context of its own; echo the caller's
    let span_cx = span.context();
    let cx = if span_cx.span().span_context().is_valid() {
        span_cx
    } else {
        parent
    };

    let carrier = inject_carrier(&cx);
    if let Some(request_id) = carrier.request_id() {
        span.record("request_id", request_id);
        request
            .extensions_mut()
            .insert(RequestId(request_id.to_string()));
    }

    let mut response = next.run(request).instrument(span.clone()).await;

    span.record("http.status_code", response.status().as_u16());
    inject_headers(&cx, response.headers_mut());

    tracing::debug!(parent: &span, "Propagation headers written");
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use dltrace_core::tracing::TelemetryConfig;
    use dltrace_core::tracing::carrier::derive_request_id;
    use dltrace_core::tracing::init::build_tracer_provider;
    use http::StatusCode;
    use opentelemetry::trace::TracerProvider as _;
    use tower::ServiceExt;
    use tracing_subscriber::layer::SubscriberExt;

    const TRACEPARENT: &str = "00-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-01";
    const REQUEST_ID: &str = "1-6040dce1-ae43ffe2332af577aa0af6af";

    async fn optional_id(request_id: Option<RequestId>) -> String {
        request_id.map_or_else(|| "none".to_string(), |id| id.to_string())
    }

    async fn required_id(request_id: RequestId) -> String {
        request_id.as_str().to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(optional_id))
            .route("/required", get(required_id))
            .layer(axum::middleware::from_fn(propagation_middleware))
    }

    fn request(uri: &str, traceparent: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(traceparent) = traceparent {
            builder = builder.header("traceparent", traceparent);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_traceparent_is_echoed_with_request_id() {
        let response = app()
            .oneshot(request("/", Some(TRACEPARENT)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("traceparent").unwrap(), TRACEPARENT);
        assert_eq!(
            response.headers().get("x-dl-request-id").unwrap(),
            REQUEST_ID
        );
        let xray = response
            .headers()
            .get("x-amzn-trace-id")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(xray.contains(&format!("Root={REQUEST_ID}")), "{xray}");
        assert_eq!(body_string(response).await, REQUEST_ID);
    }

    #[tokio::test]
    async fn test_unsampled_traceparent_keeps_request_id() {
        let traceparent = "00-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-00";
        let response = app()
            .oneshot(request("/", Some(traceparent)))
            .await
            .unwrap();

        assert_eq!(response.headers().get("traceparent").unwrap(), traceparent);
        assert_eq!(
            response.headers().get("x-dl-request-id").unwrap(),
            REQUEST_ID
        );
    }

    #[tokio::test]
    async fn test_no_trace_context() {
        let response = app().oneshot(request("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("traceparent").is_none());
        assert!(response.headers().get("x-dl-request-id").is_none());
        assert_eq!(body_string(response).await, "none");
    }

    #[tokio::test]
    async fn test_malformed_traceparent_is_ignored() {
        let response = app()
            .oneshot(request("/", Some("00-not-a-traceparent")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-dl-request-id").is_none());
        assert_eq!(body_string(response).await, "none");
    }

    #[tokio::test]
    async fn test_required_request_id_rejects_without_context() {
        let response = app().oneshot(request("/required", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "missing_request_id");
    }

    #[tokio::test]
    async fn test_required_request_id_with_context() {
        let response = app()
            .oneshot(request("/required", Some(TRACEPARENT)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, REQUEST_ID);
    }

    #[tokio::test]
    async fn test_server_span_continues_trace() {
        let provider = build_tracer_provider(&TelemetryConfig::dev().with_sample_ratio(0.0));
        let subscriber = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("test")));
        let _guard = tracing::subscriber::set_default(subscriber);

        let response = app()
            .oneshot(request("/", Some(TRACEPARENT)))
            .await
            .unwrap();

        let traceparent = response
            .headers()
            .get("traceparent")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        // Same trace, new span, and the sampled parent wins over ratio 0
        assert!(traceparent.starts_with("00-6040dce1ae43ffe2332af577aa0af6af-"));
        assert!(!traceparent.contains("f060f1fc34bcb745"));
        assert!(traceparent.ends_with("-01"));
        assert_eq!(
            response.headers().get("x-dl-request-id").unwrap(),
            REQUEST_ID
        );
    }

    #[tokio::test]
    async fn test_server_span_starts_root_trace() {
        let provider = build_tracer_provider(&TelemetryConfig::dev().with_sample_ratio(1.0));
        let subscriber = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("test")));
        let _guard = tracing::subscriber::set_default(subscriber);

        let response = app().oneshot(request("/", None)).await.unwrap();

        let traceparent = response
            .headers()
            .get("traceparent")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let request_id = response
            .headers()
            .get("x-dl-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        assert!(traceparent.ends_with("-01"));
        assert_eq!(derive_request_id(&traceparent), Some(request_id.clone()));
        assert_eq!(body_string(response).await, request_id);
    }

    #[test]
    fn test_request_id_ext() {
        let mut request = request("/", None);
        assert!(request.request_id().is_none());

        request
            .extensions_mut()
            .insert(RequestId(REQUEST_ID.to_string()));
        assert_eq!(request.request_id().map(RequestId::as_str), Some(REQUEST_ID));
    }
}
