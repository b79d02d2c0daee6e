//! Prelude for common tracing functionality
//!
//! This module re-exports commonly used types and functions for convenience.

pub use crate::tracing::carrier::{
    Carrier, HeaderCarrier, REQUEST_ID_HEADER, TRACEPARENT_HEADER, derive_request_id,
};
pub use crate::tracing::config::TelemetryConfig;
pub use crate::tracing::propagation::{
    correlation_span, extract_context, inject_headers, tracing_headers,
};
pub use crate::tracing::sampler::{
    RatioSampler, SampleRatio, SamplingDecider, SamplingDecision, SamplingRequest,
};
pub use crate::tracing::trace_context::TraceParent;

#[cfg(feature = "subscriber")]
pub use crate::tracing::init::{TelemetryGuard, init_tracing, is_initialized};

// Re-export common tracing macros and types
pub use tracing::{Instrument, debug, error, info, instrument, trace, warn};

/// Log with the request id of the current context attached
#[macro_export]
macro_rules! info_with_request_id {
    ($($arg:tt)*) => {
        {
            if let Some(request_id) = $crate::tracing::propagation::current_request_id() {
                ::tracing::info!(request_id = %request_id, $($arg)*);
            } else {
                ::tracing::info!($($arg)*);
            }
        }
    };
}
