//! HTTP integration for dltrace
//!
//! Axum middleware that continues incoming traces and writes the
//! propagation headers, including `X-Dl-Request-Id`, onto every response.

pub mod error;
pub mod middleware;

pub use error::{HttpError, Result};
pub use middleware::{RequestId, RequestIdExt, propagation_middleware};
