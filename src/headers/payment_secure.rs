//! `X-PAYMENT-SECURE` parser/builder (spec.md §4.1).
//!
//! Grammar: `"w3c.v1" (";" key "=" value)+`, max 4096 bytes. `tp` is required
//! and must be a well-formed `traceparent`; `ts` is optional and opaque to
//! this parser (its payload is interpreted by `trace_context::TracestateContext`).
//! Unknown segments are a hard error.

use crate::headers::HeaderError;
use crate::trace_context::{TraceContext, Traceparent};

const MAX_LEN: usize = 4096;
const PREFIX: &str = "w3c.v1";

pub fn parse(value: &str) -> Result<TraceContext, HeaderError> {
    if value.len() > MAX_LEN {
        return Err(HeaderError::PaymentSecure(format!(
            "exceeds {MAX_LEN} bytes"
        )));
    }
    let mut segments = value.split(';');
    let prefix = segments
        .next()
        .ok_or_else(|| HeaderError::PaymentSecure("empty header".to_string()))?;
    if prefix != PREFIX {
        if prefix.starts_with("w3c.v") {
            return Err(HeaderError::PaymentSecureUnsupported(prefix.to_string()));
        }
        return Err(HeaderError::PaymentSecure(format!(
            "expected prefix '{PREFIX}', got '{prefix}'"
        )));
    }

    let mut tp: Option<String> = None;
    let mut ts: Option<String> = None;
    let mut any_segment = false;

    for segment in segments {
        any_segment = true;
        let (key, raw_value) = segment
            .split_once('=')
            .ok_or_else(|| HeaderError::PaymentSecure(format!("malformed segment '{segment}'")))?;
        match key {
            "tp" => tp = Some(raw_value.to_string()),
            "ts" => {
                let decoded = percent_decode(raw_value).map_err(|_| {
                    HeaderError::PaymentSecure("ts is not valid percent-encoding".to_string())
                })?;
                ts = Some(decoded);
            }
            other => {
                return Err(HeaderError::PaymentSecure(format!(
                    "unknown segment key '{other}'"
                )))
            }
        }
    }

    if !any_segment {
        return Err(HeaderError::PaymentSecure(
            "at least one key=value segment is required".to_string(),
        ));
    }

    let tp = tp.ok_or_else(|| HeaderError::PaymentSecure("missing required 'tp'".to_string()))?;
    let traceparent = Traceparent::parse(&tp)
        .map_err(|e| HeaderError::PaymentSecure(format!("invalid tp: {e}")))?;

    Ok(TraceContext {
        traceparent,
        tracestate: ts,
    })
}

/// Builds `w3c.v1;tp=<tp>[;ts=<ts>]` from a traceparent and an optional
/// `tracestate` JSON context. Fails if there's no span to serialize, or the
/// built value would exceed 4096 bytes.
pub fn build(
    traceparent: &Traceparent,
    tracestate: Option<&crate::trace_context::TracestateContext>,
) -> Result<String, HeaderError> {
    let mut out = format!("{PREFIX};tp={traceparent}");
    if let Some(ctx) = tracestate {
        let encoded = ctx
            .encode()
            .map_err(|e| HeaderError::PaymentSecure(format!("failed to encode ts: {e}")))?;
        out.push_str(";ts=");
        out.push_str(&percent_encode(&encoded));
    }
    if out.len() > MAX_LEN {
        return Err(HeaderError::PaymentSecure(format!(
            "built value exceeds {MAX_LEN} bytes"
        )));
    }
    Ok(out)
}

/// Minimal percent-encoding sufficient for base64's alphabet (`+`, `/`, `=`).
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'+' => out.push_str("%2B"),
            b'/' => out.push_str("%2F"),
            b'=' => out.push_str("%3D"),
            _ => out.push(byte as char),
        }
    }
    out
}

fn percent_decode(s: &str) -> Result<String, std::num::ParseIntError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            let byte = u8::from_str_radix(hex, 16)?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace_context::TracestateContext;

    const TP: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn parses_tp_only() {
        let value = format!("w3c.v1;tp={TP}");
        let ctx = parse(&value).unwrap();
        assert_eq!(ctx.traceparent.to_string(), TP);
        assert!(ctx.tracestate.is_none());
    }

    #[test]
    fn rejects_missing_tp() {
        let err = parse("w3c.v1;ts=abc").unwrap_err();
        assert!(matches!(err, HeaderError::PaymentSecure(_)));
    }

    #[test]
    fn rejects_unsupported_version_distinctly() {
        let value = format!("w3c.v2;tp={TP}");
        let err = parse(&value).unwrap_err();
        assert!(matches!(err, HeaderError::PaymentSecureUnsupported(_)));
    }

    #[test]
    fn rejects_unknown_segment() {
        let value = format!("w3c.v1;tp={TP};bogus=1");
        assert!(parse(&value).is_err());
    }

    #[test]
    fn rejects_oversized_header() {
        let value = format!("w3c.v1;tp={TP};ts={}", "a".repeat(MAX_LEN));
        assert!(parse(&value).is_err());
    }

    #[test]
    fn round_trips_through_build_and_parse() {
        let traceparent = Traceparent::parse(TP).unwrap();
        let tracestate = TracestateContext {
            tid: Some("d290f1ee-6c54-4b01-90e6-d701748f0851".to_string()),
        };
        let built = build(&traceparent, Some(&tracestate)).unwrap();
        let parsed = parse(&built).unwrap();
        assert_eq!(parsed.traceparent, traceparent);
        let decoded =
            TracestateContext::decode(&parsed.tracestate.unwrap()).unwrap();
        assert_eq!(decoded.tid, tracestate.tid);
    }

    #[test]
    fn build_fails_when_output_too_large() {
        let traceparent = Traceparent::parse(TP).unwrap();
        let huge_tid = "x".repeat(8192);
        let tracestate = TracestateContext { tid: Some(huge_tid) };
        assert!(build(&traceparent, Some(&tracestate)).is_err());
    }
}
