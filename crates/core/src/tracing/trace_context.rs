//! W3C `traceparent` value parsing
//!
//! See: https://www.w3.org/TR/trace-context/#traceparent-header
//!
//! ```text
//! 00-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-01
//! ^^ version
//!    ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ trace-id
//!                                     ^^^^^^^^^^^^^^^^ parent-id
//!                                                      ^^ trace-flags
//! ```
//!
//! [`TraceParent`] is the only parser for these values in the crate; the
//! carrier derives `X-Dl-Request-Id` from it.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// W3C Trace Context header names
pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Version value reserved as invalid by the W3C format
const INVALID_VERSION: u8 = 0xff;
const SAMPLED_FLAG: u8 = 0x01;

/// Errors that can occur when parsing a traceparent value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceParentError {
    #[error("Invalid traceparent format")]
    InvalidFormat,
    #[error("Invalid version: {0}")]
    InvalidVersion(String),
    #[error("Invalid trace ID")]
    InvalidTraceId,
    #[error("Invalid parent ID")]
    InvalidParentId,
    #[error("Invalid flags")]
    InvalidFlags,
}

/// A parsed `traceparent` header value.
///
/// Parsing accepts upper or lower case hex; [`Display`](fmt::Display) and the
/// derived request id are always lower case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TraceParent {
    version: u8,
    trace_id: [u8; 16],
    parent_id: [u8; 8],
    flags: u8,
}

impl TraceParent {
    /// Build a version `00` traceparent from raw ids.
    pub const fn new(trace_id: [u8; 16], parent_id: [u8; 8], sampled: bool) -> Self {
        Self {
            version: 0,
            trace_id,
            parent_id,
            flags: if sampled { SAMPLED_FLAG } else { 0 },
        }
    }

    pub const fn version(&self) -> u8 {
        self.version
    }

    pub const fn trace_id(&self) -> &[u8; 16] {
        &self.trace_id
    }

    pub const fn parent_id(&self) -> &[u8; 8] {
        &self.parent_id
    }

    pub const fn flags(&self) -> u8 {
        self.flags
    }

    /// Check if the sampled bit of the trace flags is set
    pub const fn is_sampled(&self) -> bool {
        self.flags & SAMPLED_FLAG != 0
    }

    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn parent_id_hex(&self) -> String {
        hex::encode(self.parent_id)
    }

    /// Secondary request id derived from the trace ID: `1-<8 hex>-<24 hex>`.
    ///
    /// The trace flags play no part in the result.
    pub fn request_id(&self) -> String {
        let trace_id = self.trace_id_hex();
        let (head, tail) = trace_id.split_at(8);
        format!("1-{head}-{tail}")
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version,
            hex::encode(self.trace_id),
            hex::encode(self.parent_id),
            self.flags
        )
    }
}

impl FromStr for TraceParent {
    type Err = TraceParentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        let [version, trace_id, parent_id, flags] = parts[..] else {
            return Err(TraceParentError::InvalidFormat);
        };

        let version = decode_byte(version)
            .filter(|v| *v != INVALID_VERSION)
            .ok_or_else(|| TraceParentError::InvalidVersion(version.to_string()))?;

        let trace_id: [u8; 16] =
            decode_id(trace_id).ok_or(TraceParentError::InvalidTraceId)?;
        let parent_id: [u8; 8] =
            decode_id(parent_id).ok_or(TraceParentError::InvalidParentId)?;
        let flags = decode_byte(flags).ok_or(TraceParentError::InvalidFlags)?;

        Ok(Self {
            version,
            trace_id,
            parent_id,
            flags,
        })
    }
}

fn decode_byte(segment: &str) -> Option<u8> {
    let mut byte = [0u8; 1];
    hex::decode_to_slice(segment, &mut byte).ok()?;
    Some(byte[0])
}

/// Decode a fixed length, non-zero hex id
fn decode_id<const N: usize>(segment: &str) -> Option<[u8; N]> {
    let mut id = [0u8; N];
    hex::decode_to_slice(segment, &mut id).ok()?;
    id.iter().any(|b| *b != 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "00-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-01";
    const REQUEST_ID: &str = "1-6040dce1-ae43ffe2332af577aa0af6af";

    #[test]
    fn test_parse_traceparent() {
        let ctx = TraceParent::from_str(SAMPLE).unwrap();

        assert_eq!(ctx.version(), 0);
        assert_eq!(ctx.trace_id_hex(), "6040dce1ae43ffe2332af577aa0af6af");
        assert_eq!(ctx.parent_id_hex(), "f060f1fc34bcb745");
        assert_eq!(ctx.flags(), 1);
        assert!(ctx.is_sampled());

        assert_eq!(ctx.to_string(), SAMPLE);
    }

    #[test]
    fn test_unsampled_flags() {
        let ctx: TraceParent = "00-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-00"
            .parse()
            .unwrap();
        assert!(!ctx.is_sampled());
        assert_eq!(ctx.flags(), 0);
    }

    #[test]
    fn test_request_id_ignores_flags() {
        let sampled = TraceParent::from_str(SAMPLE).unwrap();
        let unsampled =
            TraceParent::from_str("00-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-00")
                .unwrap();

        assert_eq!(sampled.request_id(), REQUEST_ID);
        assert_eq!(sampled.request_id(), unsampled.request_id());
    }

    #[test]
    fn test_upper_case_hex_is_normalized() {
        let ctx = TraceParent::from_str("00-6040DCE1AE43FFE2332AF577AA0AF6AF-F060F1FC34BCB745-01")
            .unwrap();
        assert_eq!(ctx.request_id(), REQUEST_ID);
        assert_eq!(ctx.to_string(), SAMPLE);
    }

    #[test]
    fn test_future_versions() {
        let ctx = TraceParent::from_str("01-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-01")
            .unwrap();
        assert_eq!(ctx.version(), 1);
        assert_eq!(ctx.request_id(), REQUEST_ID);

        assert_eq!(
            TraceParent::from_str("ff-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-01"),
            Err(TraceParentError::InvalidVersion("ff".to_string()))
        );
        assert!(matches!(
            TraceParent::from_str("0-6040dce1ae43ffe2332af577aa0af6af-f060f1fc34bcb745-01"),
            Err(TraceParentError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_invalid_traceparent() {
        // Wrong number of parts
        assert_eq!(
            TraceParent::from_str("00-invalid"),
            Err(TraceParentError::InvalidFormat)
        );
        assert_eq!(
            TraceParent::from_str(&format!("{SAMPLE}-extra")),
            Err(TraceParentError::InvalidFormat)
        );
        assert_eq!(TraceParent::from_str(""), Err(TraceParentError::InvalidFormat));

        // Trace ID too short
        assert_eq!(
            TraceParent::from_str("00-4bf92f3577b34da6-00f067aa0ba902b7-01"),
            Err(TraceParentError::InvalidTraceId)
        );

        // Trace ID not hex
        assert_eq!(
            TraceParent::from_str("00-zzf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
            Err(TraceParentError::InvalidTraceId)
        );

        // Trace ID all zeros
        assert_eq!(
            TraceParent::from_str("00-00000000000000000000000000000000-00f067aa0ba902b7-01"),
            Err(TraceParentError::InvalidTraceId)
        );

        // Parent ID wrong length
        assert_eq!(
            TraceParent::from_str("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa-01"),
            Err(TraceParentError::InvalidParentId)
        );

        // Parent ID all zeros
        assert_eq!(
            TraceParent::from_str("00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01"),
            Err(TraceParentError::InvalidParentId)
        );

        // Flags not hex, or too long
        assert_eq!(
            TraceParent::from_str("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-xy"),
            Err(TraceParentError::InvalidFlags)
        );
        assert_eq!(
            TraceParent::from_str("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-011"),
            Err(TraceParentError::InvalidFlags)
        );
    }

    #[test]
    fn test_new_traceparent() {
        let ctx = TraceParent::new([0xab; 16], [0xcd; 8], false);
        assert_eq!(
            ctx.to_string(),
            "00-abababababababababababababababab-cdcdcdcdcdcdcdcd-00"
        );
        assert!(!ctx.is_sampled());
        assert_eq!(ctx.to_string().parse::<TraceParent>(), Ok(ctx));
    }
}
