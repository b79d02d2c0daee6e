//! Header carrier used while injecting or extracting trace context
//!
//! A [`Carrier`] lives for one propagation step: the tracing runtime writes
//! `traceparent` (and any other propagated fields) into it, then the caller
//! copies the entries onto real transport headers, or the reverse on the
//! inbound side.
//!
//! Writing a `traceparent` entry has one side effect: a secondary request id,
//! `1-<first 8 hex of the trace id>-<remaining 24 hex>`, is derived and stored
//! under [`REQUEST_ID_HEADER`]. Downstream services that predate W3C trace
//! context correlate on that header.

use std::collections::HashMap;
use std::collections::hash_map;

use opentelemetry::propagation::{Extractor, Injector};

use crate::tracing::trace_context::TraceParent;

pub use crate::tracing::trace_context::{TRACEPARENT_HEADER, TRACESTATE_HEADER};

/// Header carrying the request id derived from the traceparent trace id
pub const REQUEST_ID_HEADER: &str = "X-Dl-Request-Id";

/// Key/value capability expected by text-map injectors and extractors.
pub trait HeaderCarrier {
    /// Value stored under `key`, if any
    fn get(&self, key: &str) -> Option<&str>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: String);

    /// All stored keys, in no particular order
    fn keys(&self) -> Vec<&str>;
}

/// Derive the secondary request id from a traceparent value.
///
/// Returns `None` when the value does not parse as a [`TraceParent`]. The
/// flags are only checked for shape.
pub fn derive_request_id(traceparent: &str) -> Option<String> {
    traceparent
        .parse::<TraceParent>()
        .ok()
        .map(|tp| tp.request_id())
}

/// Mutable, case-sensitive header map for a single propagation step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Carrier {
    headers: HashMap<String, String>,
}

impl Carrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`, or an empty string if absent
    pub fn get_or_empty(&self, key: &str) -> &str {
        HeaderCarrier::get(self, key).unwrap_or_default()
    }

    /// Store a value without the traceparent side effect.
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Request id derived from the last well-formed traceparent written, if any
    pub fn request_id(&self) -> Option<&str> {
        HeaderCarrier::get(self, REQUEST_ID_HEADER)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.headers.iter()
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.headers
    }
}

impl HeaderCarrier for Carrier {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        if !key.eq_ignore_ascii_case(TRACEPARENT_HEADER) {
            self.headers.insert(key.to_string(), value);
            return;
        }

        // The request id always describes the stored traceparent, or is absent
        match derive_request_id(&value) {
            Some(request_id) => {
                self.headers.insert(REQUEST_ID_HEADER.to_string(), request_id);
            }
            None => {
                tracing::debug!(
                    traceparent = %value,
                    "Malformed traceparent, skipping request id derivation"
                );
                self.headers.remove(REQUEST_ID_HEADER);
            }
        }
        self.headers.insert(key.to_string(), value);
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(String::as_str).collect()
    }
}

impl Injector for Carrier {
    fn set(&mut self, key: &str, value: String) {
        HeaderCarrier::set(self, key, value);
    }
}

impl Extractor for Carrier {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderCarrier::get(self, key)
    }

    fn keys(&self) -> Vec<&str> {
        HeaderCarrier::keys(self)
    }
}

impl From<HashMap<String, String>> for Carrier {
    fn from(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }
}

impl FromIterator<(String, String)> for Carrier {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut carrier = Self::new();
        carrier.extend(iter);
        carrier
    }
}

impl Extend<(String, String)> for Carrier {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        for (key, value) in iter {
            HeaderCarrier::set(self, &key, value);
        }
    }
}

impl IntoIterator for Carrier {
    type Item = (String, String);
    type IntoIter = hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.into_iter()
    }
}

impl<'a> IntoIterator for &'a Carrier {
    type Item = (&'a String, &'a String);
    type IntoIter = hash_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}
