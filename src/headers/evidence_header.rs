//! `X-AP2-EVIDENCE` parser (spec.md §4.1).
//!
//! Grammar: `"evd.v1" (";" key "=" value)+`, max 2048 bytes. Required keys:
//! `mr` (opaque reference), `ms` (base64url of a 32-byte digest), `mt` (must
//! equal `application/json`), `sz` (decimal byte count).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::headers::HeaderError;

const MAX_LEN: usize = 2048;
const PREFIX: &str = "evd.v1";
const EXPECTED_MT: &str = "application/json";

/// The decoded `X-AP2-EVIDENCE` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceHeader {
    pub mr: String,
    pub ms: [u8; 32],
    pub mt: String,
    pub sz: u64,
}

pub fn parse(value: &str) -> Result<EvidenceHeader, HeaderError> {
    if value.len() > MAX_LEN {
        return Err(HeaderError::Evidence(format!("exceeds {MAX_LEN} bytes")));
    }
    let mut segments = value.split(';');
    let prefix = segments
        .next()
        .ok_or_else(|| HeaderError::Evidence("empty header".to_string()))?;
    if prefix != PREFIX {
        if prefix.starts_with("evd.v") {
            return Err(HeaderError::EvidenceUnsupported(prefix.to_string()));
        }
        return Err(HeaderError::Evidence(format!(
            "expected prefix '{PREFIX}', got '{prefix}'"
        )));
    }

    let mut mr: Option<String> = None;
    let mut ms: Option<[u8; 32]> = None;
    let mut mt: Option<String> = None;
    let mut sz: Option<u64> = None;

    for segment in segments {
        let (key, raw_value) = segment
            .split_once('=')
            .ok_or_else(|| HeaderError::Evidence(format!("malformed segment '{segment}'")))?;
        match key {
            "mr" => mr = Some(raw_value.to_string()),
            "ms" => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(raw_value)
                    .map_err(|_| HeaderError::Evidence("ms is not valid base64url".to_string()))?;
                let digest: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| HeaderError::Evidence("ms must decode to 32 bytes".to_string()))?;
                ms = Some(digest);
            }
            "mt" => {
                if raw_value != EXPECTED_MT {
                    return Err(HeaderError::Evidence(format!(
                        "mt must equal '{EXPECTED_MT}'"
                    )));
                }
                mt = Some(raw_value.to_string());
            }
            "sz" => {
                let parsed = raw_value
                    .parse::<u64>()
                    .map_err(|_| HeaderError::Evidence("sz must be a decimal integer".to_string()))?;
                sz = Some(parsed);
            }
            other => {
                return Err(HeaderError::Evidence(format!(
                    "unknown segment key '{other}'"
                )))
            }
        }
    }

    Ok(EvidenceHeader {
        mr: mr.ok_or_else(|| HeaderError::Evidence("missing required 'mr'".to_string()))?,
        ms: ms.ok_or_else(|| HeaderError::Evidence("missing required 'ms'".to_string()))?,
        mt: mt.ok_or_else(|| HeaderError::Evidence("missing required 'mt'".to_string()))?,
        sz: sz.ok_or_else(|| HeaderError::Evidence("missing required 'sz'".to_string()))?,
    })
}

impl EvidenceHeader {
    /// The shape forwarded to `/risk/evaluate` as `mandate` — this header is
    /// a content-addressed reference to a mandate, not the AP2 evidence
    /// blob itself (that travels in the request body, see
    /// `proxy::shared::ParsedRequest::evidence_base64`).
    pub fn to_mandate_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ref": self.mr,
            "sha256_b64url": URL_SAFE_NO_PAD.encode(self.ms),
            "mime": self.mt,
            "size": self.sz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ms() -> String {
        URL_SAFE_NO_PAD.encode([7u8; 32])
    }

    #[test]
    fn parses_well_formed_header() {
        let value = format!("evd.v1;mr=ref-1;ms={};mt=application/json;sz=128", sample_ms());
        let parsed = parse(&value).unwrap();
        assert_eq!(parsed.mr, "ref-1");
        assert_eq!(parsed.ms, [7u8; 32]);
        assert_eq!(parsed.sz, 128);
    }

    #[test]
    fn rejects_unsupported_version_distinctly() {
        let value = format!("evd.v2;mr=ref-1;ms={};mt=application/json;sz=128", sample_ms());
        let err = parse(&value).unwrap_err();
        assert!(matches!(err, HeaderError::EvidenceUnsupported(_)));
    }

    #[test]
    fn rejects_wrong_mt() {
        let value = format!("evd.v1;mr=ref-1;ms={};mt=text/plain;sz=128", sample_ms());
        assert!(parse(&value).is_err());
    }

    #[test]
    fn rejects_missing_required_key() {
        let value = format!("evd.v1;mr=ref-1;ms={};sz=128", sample_ms());
        assert!(parse(&value).is_err());
    }

    #[test]
    fn rejects_oversized_header() {
        let value = format!("evd.v1;mr={}", "a".repeat(MAX_LEN));
        assert!(parse(&value).is_err());
    }
}
