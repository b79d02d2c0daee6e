//! Middleware components for HTTP request processing

pub mod propagation;

pub use propagation::{RequestId, RequestIdExt, propagation_middleware};
