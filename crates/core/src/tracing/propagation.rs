//! Moving trace context in and out of HTTP headers
//!
//! Context is written in two formats: W3C `traceparent`/`tracestate` and the
//! AWS X-Ray `X-Amzn-Trace-Id` header. Injection always goes through a
//! [`Carrier`], so every set of outgoing headers that contains a
//! `traceparent` also carries the derived `X-Dl-Request-Id`.

use std::collections::HashMap;

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::Context;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry_aws::trace::XrayPropagator;
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::tracing::carrier::{Carrier, REQUEST_ID_HEADER, TRACEPARENT_HEADER};

/// Writes propagated fields straight into an [`http::HeaderMap`]
pub struct HeaderMapInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderMapInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                self.0.insert(name, value);
            }
            _ => tracing::debug!(header = %key, "Skipping header that is not valid HTTP"),
        }
    }
}

/// Reads propagated fields from an [`http::HeaderMap`]
pub struct HeaderMapExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Propagator writing and reading both W3C trace context and X-Ray headers.
///
/// On extraction a valid `traceparent` wins over `X-Amzn-Trace-Id`.
pub fn propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(XrayPropagator::default()),
        Box::new(TraceContextPropagator::new()),
    ])
}

/// Inject `cx` into a fresh carrier
pub fn inject_carrier(cx: &Context) -> Carrier {
    let mut carrier = Carrier::new();
    propagator().inject_context(cx, &mut carrier);
    carrier
}

/// Tracing headers for `cx`, merged over `base` when given.
///
/// The result holds `traceparent`, `tracestate`, `X-Amzn-Trace-Id` and the
/// derived `X-Dl-Request-Id`.
/// A context without a valid span leaves `base` untouched.
pub fn tracing_headers(
    cx: &Context,
    base: Option<HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut headers = base.unwrap_or_default();
    headers.extend(inject_carrier(cx));
    headers
}

/// Copy the tracing headers for `cx` onto `headers`
pub fn inject_headers(cx: &Context, headers: &mut HeaderMap) {
    let mut injector = HeaderMapInjector(headers);
    for (key, value) in inject_carrier(cx) {
        injector.set(&key, value);
    }
}

/// Parent context carried by incoming `headers`, or the current context if none
pub fn extract_context(headers: &HeaderMap) -> Context {
    propagator().extract(&HeaderMapExtractor(headers))
}

/// Request id derived from the span active in the current context
pub fn current_request_id() -> Option<String> {
    inject_carrier(&Context::current())
        .request_id()
        .map(str::to_string)
}

/// Span carrying the correlation headers of `cx` as fields.
///
/// Events emitted inside it are tagged with the traceparent and request id.
pub fn correlation_span(cx: &Context) -> tracing::Span {
    let carrier = inject_carrier(cx);
    tracing::info_span!(
        "correlation",
        traceparent = carrier.get_or_empty(TRACEPARENT_HEADER),
        request_id = carrier.get_or_empty(REQUEST_ID_HEADER),
    )
}
