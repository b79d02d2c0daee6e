//! Common error handling for telemetry setup

/// Standard result type for telemetry operations
pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while configuring or installing telemetry.
///
/// Sampling and header propagation never fail; only the setup paths
/// (configuration loading, subscriber installation) return these.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Telemetry already initialized")]
    AlreadyInitialized,

    #[error("Failed to install subscriber: {message}")]
    Subscriber { message: String },

    #[error("Tracer provider shutdown failed: {message}")]
    Shutdown { message: String },
}

impl TelemetryError {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a subscriber installation error
    pub fn subscriber(message: impl Into<String>) -> Self {
        Self::Subscriber {
            message: message.into(),
        }
    }

    /// Create a shutdown error
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}
