//! Trace sampling and context propagation
//!
//! - [`tracing::sampler::RatioSampler`]: parent-aware ratio sampler, usable
//!   directly or as an `opentelemetry_sdk` sampler
//! - [`tracing::carrier::Carrier`]: text-map carrier that derives
//!   `X-Dl-Request-Id` whenever a `traceparent` is written
//! - [`tracing::init::init_tracing`]: subscriber and tracer provider bootstrap

pub mod error;
pub mod tracing;

pub use error::{TelemetryError, TelemetryResult};
