//! Parent-aware ratio sampling
//!
//! A span inherits its parent's sampling decision whenever it has a valid
//! parent, so a trace is either kept or dropped as a whole. Only root spans
//! consult the configured ratio:
//!
//! - `ratio >= 1`: always record and sample
//! - `ratio <= 0`: always drop
//! - otherwise: draw `r` uniformly from `[0, 1)` and drop when `r > ratio`
//!
//! Out of range ratios are accepted and fall into the first two branches.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use opentelemetry::trace::{
    Link, SamplingDecision as OtelSamplingDecision, SamplingResult, SpanKind, TraceContextExt,
    TraceId, TraceState,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::ShouldSample;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Fraction of root spans to keep, conventionally in `[0, 1]`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleRatio(f64);

impl SampleRatio {
    /// Keep every root span
    pub const ALWAYS: Self = Self(1.0);
    /// Drop every root span
    pub const NEVER: Self = Self(0.0);

    pub const fn new(ratio: f64) -> Self {
        Self(ratio)
    }

    pub const fn get(self) -> f64 {
        self.0
    }
}

impl Default for SampleRatio {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl From<f64> for SampleRatio {
    fn from(ratio: f64) -> Self {
        Self(ratio)
    }
}

impl fmt::Display for SampleRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Sampling decision for a single span
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplingDecision {
    RecordAndSample,
    Drop,
}

impl SamplingDecision {
    pub const fn is_sampled(self) -> bool {
        matches!(self, Self::RecordAndSample)
    }
}

impl From<SamplingDecision> for OtelSamplingDecision {
    fn from(decision: SamplingDecision) -> Self {
        match decision {
            SamplingDecision::RecordAndSample => Self::RecordAndSample,
            SamplingDecision::Drop => Self::Drop,
        }
    }
}

/// What the sampler knows about a span about to be created
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplingRequest {
    /// `None` for a root span, otherwise whether the parent was sampled
    pub parent_sampled: Option<bool>,
    /// Propagated trace state of the parent, empty for root spans
    pub trace_state: TraceState,
}

impl SamplingRequest {
    /// Request for a span without a parent
    pub fn root() -> Self {
        Self::default()
    }

    /// Request for a span whose parent made the given decision
    pub const fn child_of(parent_sampled: bool, trace_state: TraceState) -> Self {
        Self {
            parent_sampled: Some(parent_sampled),
            trace_state,
        }
    }

    /// Build a request from the parent context handed over by the tracing runtime.
    ///
    /// The parent counts as present only when the context holds an active span
    /// with a valid span context.
    pub fn from_context(parent_context: Option<&Context>) -> Self {
        let Some(cx) = parent_context.filter(|cx| cx.has_active_span()) else {
            return Self::root();
        };

        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            Self::child_of(span_context.is_sampled(), span_context.trace_state().clone())
        } else {
            Self::root()
        }
    }

    pub const fn is_root(&self) -> bool {
        self.parent_sampled.is_none()
    }
}

/// Decision plus the trace state to carry on the new span
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingOutcome {
    pub decision: SamplingDecision,
    pub trace_state: TraceState,
}

/// Source of uniformly distributed values in `[0, 1)`.
///
/// Implementations are shared between every span created in the process and
/// must tolerate concurrent calls.
pub trait RandomSource: Send + Sync + fmt::Debug {
    fn next_f64(&self) -> f64;
}

/// Thread local generator, seeded from the OS on first use in each thread
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Explicitly seeded generator, for reproducible sampling sequences
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0.0..1.0)
    }
}

/// Capability the tracing runtime needs from a sampler
pub trait SamplingDecider: Send + Sync {
    /// Decide whether the span described by `request` is recorded
    fn should_sample(&self, request: &SamplingRequest) -> SamplingOutcome;

    /// Short human readable description, for diagnostics only
    fn description(&self) -> String;
}

/// Parent based sampler that falls back to a fixed ratio for root spans
#[derive(Clone, Debug)]
pub struct RatioSampler {
    ratio: SampleRatio,
    source: Arc<dyn RandomSource>,
}

impl RatioSampler {
    /// Sampler drawing from the thread local generator
    pub fn new(ratio: impl Into<SampleRatio>) -> Self {
        Self::with_source(ratio, Arc::new(ThreadRandom))
    }

    pub fn with_source(ratio: impl Into<SampleRatio>, source: Arc<dyn RandomSource>) -> Self {
        Self {
            ratio: ratio.into(),
            source,
        }
    }

    pub const fn ratio(&self) -> SampleRatio {
        self.ratio
    }

    fn decide_root(&self) -> SamplingDecision {
        let ratio = self.ratio.get();
        if ratio >= 1.0 {
            return SamplingDecision::RecordAndSample;
        }
        if ratio <= 0.0 {
            return SamplingDecision::Drop;
        }

        if self.source.next_f64() > ratio {
            SamplingDecision::Drop
        } else {
            SamplingDecision::RecordAndSample
        }
    }
}

impl Default for RatioSampler {
    fn default() -> Self {
        Self::new(SampleRatio::default())
    }
}

impl SamplingDecider for RatioSampler {
    fn should_sample(&self, request: &SamplingRequest) -> SamplingOutcome {
        let decision = match request.parent_sampled {
            Some(true) => SamplingDecision::RecordAndSample,
            Some(false) => SamplingDecision::Drop,
            None => self.decide_root(),
        };

        SamplingOutcome {
            decision,
            trace_state: request.trace_state.clone(),
        }
    }

    fn description(&self) -> String {
        format!("ratio: {}", self.ratio)
    }
}

impl ShouldSample for RatioSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let request = SamplingRequest::from_context(parent_context);
        let outcome = SamplingDecider::should_sample(self, &request);

        SamplingResult {
            decision: outcome.decision.into(),
            attributes: Vec::new(),
            trace_state: outcome.trace_state,
        }
    }
}
