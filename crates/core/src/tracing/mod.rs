//! Sampling and trace-context propagation
//!
//! [`sampler`] decides which spans are recorded; [`carrier`] holds the
//! headers exchanged with other services and derives the `X-Dl-Request-Id`
//! correlation header from `traceparent`.

pub mod carrier;
pub mod config;
pub mod prelude;
pub mod propagation;
pub mod sampler;
pub mod trace_context;

#[cfg(feature = "subscriber")]
pub mod init;

// Re-export commonly used types
pub use carrier::{Carrier, HeaderCarrier, REQUEST_ID_HEADER, TRACEPARENT_HEADER};
pub use self::config::TelemetryConfig;
pub use sampler::{
    RandomSource, RatioSampler, SampleRatio, SamplingDecider, SamplingDecision, SamplingOutcome,
    SamplingRequest,
};
pub use trace_context::{TraceParent, TraceParentError};
