//! Initialization functions for tracing
//!
//! Installs the global subscriber and an OpenTelemetry tracer provider that
//! samples with [`RatioSampler`](crate::tracing::sampler::RatioSampler).
//! Trace ids come from the X-Ray generator: the first 8 hex digits are the
//! start time in epoch seconds, so the derived `X-Dl-Request-Id` is also a
//! valid X-Ray root id.
//! No exporter is attached here; spans still get ids, sampling flags and
//! propagate across requests. Callers that export spans register their own
//! processor on a provider of their own.

use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_aws::trace::XrayIdGenerator;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{TelemetryError, TelemetryResult};
use crate::tracing::config::TelemetryConfig;
use crate::tracing::propagation::propagator;
use crate::tracing::sampler::SamplingDecider;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Whether [`init_tracing`] has completed in this process
pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Keeps the tracer provider alive; shuts it down when dropped
#[derive(Debug)]
#[must_use = "dropping the guard shuts the tracer provider down"]
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// The installed tracer provider
    pub const fn provider(&self) -> Option<&SdkTracerProvider> {
        self.provider.as_ref()
    }

    /// Shut the tracer provider down now
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to shut down cleanly
    pub fn shutdown(mut self) -> TelemetryResult<()> {
        match self.provider.take() {
            Some(provider) => provider
                .shutdown()
                .map_err(|e| TelemetryError::shutdown(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Tracer provider shutdown failed");
            }
        }
    }
}

/// Build a tracer provider sampling with the configured ratio
pub fn build_tracer_provider(config: &TelemetryConfig) -> SdkTracerProvider {
    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes(config.resource_attributes())
        .build();

    SdkTracerProvider::builder()
        .with_sampler(config.sampler())
        .with_id_generator(XrayIdGenerator::default())
        .with_resource(resource)
        .build()
}

/// Initialize tracing with the given configuration
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] for an invalid configuration,
/// [`TelemetryError::AlreadyInitialized`] when called twice, and
/// [`TelemetryError::Subscriber`] when another global subscriber is already set
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    config.validate()?;

    if INITIALIZED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(TelemetryError::AlreadyInitialized);
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = build_tracer_provider(config);
    let tracer = provider.tracer(config.service_name.clone());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let json_layer = config.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
    });
    let text_layer = (!config.json_logs).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init();

    if let Err(e) = installed {
        INITIALIZED.store(false, Ordering::Release);
        if let Err(shutdown_err) = provider.shutdown() {
            tracing::warn!(error = %shutdown_err, "Tracer provider shutdown failed");
        }
        return Err(TelemetryError::subscriber(e.to_string()));
    }

    global::set_text_map_propagator(propagator());
    global::set_tracer_provider(provider.clone());

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        sampler = %config.sampler().description(),
        "Tracing initialized"
    );

    Ok(TelemetryGuard {
        provider: Some(provider),
    })
}

/// Initialize with default configuration from environment
///
/// # Errors
///
/// See [`init_tracing`]
pub fn init_default() -> TelemetryResult<TelemetryGuard> {
    init_tracing(&TelemetryConfig::from_env())
}

/// Initialize with development configuration
///
/// # Errors
///
/// See [`init_tracing`]
pub fn init_dev() -> TelemetryResult<TelemetryGuard> {
    init_tracing(&TelemetryConfig::dev())
}
