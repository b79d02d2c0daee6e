//! Configuration for tracing and sampling
//!
//! This module provides the configuration consumed by
//! [`init_tracing`](crate::tracing::init::init_tracing).

use std::collections::HashMap;
use std::path::Path;

use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};

use crate::error::{TelemetryError, TelemetryResult};
use crate::tracing::sampler::{RatioSampler, SampleRatio};

/// Prefix for environment overrides when loading from a file
pub const ENV_PREFIX: &str = "DLTRACE";

/// Main telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name for tracing
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Log level filter (e.g., "info", "debug", "trace")
    pub log_level: String,
    /// Emit log lines as JSON instead of the human readable format
    pub json_logs: bool,
    /// Fraction of root spans to record
    pub sample_ratio: SampleRatio,
    /// Extra resource attributes attached to every span
    pub attributes: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "dltrace".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            sample_ratio: SampleRatio::default(),
            attributes: HashMap::new(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Supports the following environment variables:
    /// - `OTEL_SERVICE_NAME` or `SERVICE_NAME`: Service name
    /// - `OTEL_SERVICE_VERSION` or `SERVICE_VERSION`: Service version
    /// - `RUST_LOG`: Log level filter
    /// - `OTEL_TRACES_SAMPLER_ARG`: Sampling ratio for root spans
    /// - `OTEL_RESOURCE_ATTRIBUTES`: Comma-separated attributes (key=value)
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let service_name = lookup("OTEL_SERVICE_NAME")
            .or_else(|| lookup("SERVICE_NAME"))
            .unwrap_or(defaults.service_name);

        let service_version = lookup("OTEL_SERVICE_VERSION")
            .or_else(|| lookup("SERVICE_VERSION"))
            .unwrap_or(defaults.service_version);

        let log_level = lookup("RUST_LOG").unwrap_or(defaults.log_level);

        let sample_ratio = lookup("OTEL_TRACES_SAMPLER_ARG")
            .and_then(|arg| arg.trim().parse::<f64>().ok())
            .map_or(defaults.sample_ratio, SampleRatio::new);

        let attributes = lookup("OTEL_RESOURCE_ATTRIBUTES")
            .map(|attrs| parse_key_values(&attrs))
            .unwrap_or_default();

        Self {
            service_name,
            service_version,
            log_level,
            json_logs: defaults.json_logs,
            sample_ratio,
            attributes,
        }
    }

    /// Load configuration from a file, with `DLTRACE_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration fails [`validate`](Self::validate)
    pub fn from_file<P: AsRef<Path>>(path: P) -> TelemetryResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Create a development configuration with sensible defaults
    pub fn dev() -> Self {
        Self {
            service_name: "dltrace-dev".to_string(),
            service_version: "dev".to_string(),
            log_level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Set the root span sampling ratio
    #[must_use]
    pub fn with_sample_ratio(mut self, ratio: impl Into<SampleRatio>) -> Self {
        self.sample_ratio = ratio.into();
        self
    }

    /// Check the values serde cannot
    ///
    /// Out of range ratios are accepted, the sampler clamps them; only NaN and
    /// infinities are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] describing the first problem found
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::invalid_config("service_name must not be empty"));
        }
        if !self.sample_ratio.get().is_finite() {
            return Err(TelemetryError::invalid_config(format!(
                "sample_ratio must be a finite number, got {}",
                self.sample_ratio.get()
            )));
        }
        Ok(())
    }

    /// Resource attributes: service name and version plus the configured extras
    pub fn resource_attributes(&self) -> Vec<KeyValue> {
        let mut attributes: Vec<KeyValue> = self
            .attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        attributes.push(KeyValue::new("service.version", self.service_version.clone()));
        attributes
    }

    /// Sampler for the configured ratio
    pub fn sampler(&self) -> RatioSampler {
        RatioSampler::new(self.sample_ratio)
    }
}

fn parse_key_values(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.trim().to_string()))
            }
        })
        .collect()
}
