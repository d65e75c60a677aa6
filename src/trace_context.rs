//! W3C distributed-trace context, repurposed as a side-channel for `tid`
//! (spec.md §3, §4.1, §GLOSSARY).
//!
//! `traceparent` keeps the upstream W3C grammar exactly (`00-<trace-id>-<span-id>-<flags>`,
//! trace-id and span-id non-zero); `tracestate` here is not the W3C key/value list but an
//! opaque base64-of-JSON blob, per the source this gateway was distilled from.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::util::canonical_json::canonical_json_bytes;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceContextError {
    #[error("traceparent must have exactly 4 dash-separated fields")]
    MalformedTraceparent,
    #[error("traceparent version must be '00'")]
    UnsupportedVersion,
    #[error("trace-id must be 32 lowercase hex characters and not all zero")]
    InvalidTraceId,
    #[error("span-id must be 16 lowercase hex characters and not all zero")]
    InvalidSpanId,
    #[error("flags must be 2 hex characters")]
    InvalidFlags,
    #[error("tracestate is not valid base64")]
    InvalidTracestateEncoding,
    #[error("tracestate does not decode to a JSON object")]
    InvalidTracestateJson,
}

/// A validated `traceparent` value: `00-<32 hex>-<16 hex>-<2 hex>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traceparent {
    pub trace_id: String,
    pub span_id: String,
    pub flags: String,
}

impl Traceparent {
    pub fn parse(value: &str) -> Result<Self, TraceContextError> {
        let fields: Vec<&str> = value.split('-').collect();
        let [version, trace_id, span_id, flags] = fields.as_slice() else {
            return Err(TraceContextError::MalformedTraceparent);
        };
        if *version != "00" {
            return Err(TraceContextError::UnsupportedVersion);
        }
        if trace_id.len() != 32 || !is_lower_hex(trace_id) || is_all_zero(trace_id) {
            return Err(TraceContextError::InvalidTraceId);
        }
        if span_id.len() != 16 || !is_lower_hex(span_id) || is_all_zero(span_id) {
            return Err(TraceContextError::InvalidSpanId);
        }
        if flags.len() != 2 || !is_lower_hex(flags) {
            return Err(TraceContextError::InvalidFlags);
        }
        Ok(Traceparent {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            flags: flags.to_string(),
        })
    }
}

impl std::fmt::Display for Traceparent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "00-{}-{}-{}", self.trace_id, self.span_id, self.flags)
    }
}

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

fn is_all_zero(s: &str) -> bool {
    s.chars().all(|c| c == '0')
}

/// The JSON object smuggled through `tracestate`. Only `tid` is defined today;
/// unrecognized keys are tolerated and dropped on re-encode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracestateContext {
    pub tid: Option<String>,
}

impl TracestateContext {
    /// Decodes `tracestate`'s raw value: `base64(canonical_json(ctx))`, with
    /// the outer `urlencode` layer (spec.md §4.1) already stripped by the
    /// caller (see `headers::payment_secure`).
    pub fn decode(value: &str) -> Result<Self, TraceContextError> {
        let bytes = STANDARD
            .decode(value)
            .map_err(|_| TraceContextError::InvalidTracestateEncoding)?;
        serde_json::from_slice(&bytes).map_err(|_| TraceContextError::InvalidTracestateJson)
    }

    /// Encodes to the raw `base64(canonical_json(ctx))` form; the caller is
    /// responsible for the outer `urlencode` layer before embedding this in a
    /// `X-PAYMENT-SECURE` header.
    pub fn encode(&self) -> Result<String, TraceContextError> {
        let bytes =
            canonical_json_bytes(self).map_err(|_| TraceContextError::InvalidTracestateJson)?;
        Ok(STANDARD.encode(bytes))
    }
}

/// The full `{tp, ts}` pair, parsed out of `X-PAYMENT-SECURE`.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub traceparent: Traceparent,
    pub tracestate: Option<String>,
}

impl TraceContext {
    /// Extracts `tid`: prefers `X-RISK-TRACE` (passed in as `header_tid`) over
    /// a `tid` encoded in `tracestate`, per spec.md's recommended precedence
    /// (Open Question 2).
    pub fn resolve_tid(&self, header_tid: Option<&str>) -> Option<String> {
        if let Some(tid) = header_tid {
            return Some(tid.to_string());
        }
        self.tracestate
            .as_deref()
            .and_then(|ts| TracestateContext::decode(ts).ok())
            .and_then(|ctx| ctx.tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_traceparent() {
        let tp = Traceparent::parse(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .unwrap();
        assert_eq!(tp.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(tp.span_id, "00f067aa0ba902b7");
    }

    #[test]
    fn rejects_all_zero_trace_id() {
        let err = Traceparent::parse("00-00000000000000000000000000000000-00f067aa0ba902b7-01")
            .unwrap_err();
        assert_eq!(err, TraceContextError::InvalidTraceId);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = Traceparent::parse("00-abcd-01").unwrap_err();
        assert_eq!(err, TraceContextError::MalformedTraceparent);
    }

    #[test]
    fn tracestate_round_trips_tid() {
        let ctx = TracestateContext {
            tid: Some("d290f1ee-6c54-4b01-90e6-d701748f0851".to_string()),
        };
        let encoded = ctx.encode().unwrap();
        let decoded = TracestateContext::decode(&encoded).unwrap();
        assert_eq!(decoded.tid, ctx.tid);
    }

    #[test]
    fn header_tid_wins_over_tracestate() {
        let ctx = TracestateContext {
            tid: Some("from-tracestate".to_string()),
        };
        let encoded = ctx.encode().unwrap();
        let trace_context = TraceContext {
            traceparent: Traceparent::parse(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .unwrap(),
            tracestate: Some(encoded),
        };
        assert_eq!(
            trace_context.resolve_tid(Some("from-header")),
            Some("from-header".to_string())
        );
        assert_eq!(
            trace_context.resolve_tid(None),
            Some("from-tracestate".to_string())
        );
    }
}
