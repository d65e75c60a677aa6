//! `AP2Evidence` decoding (spec.md §3, §4.4 step 2).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AP2Evidence {
    pub version: u32,
    pub payment_hash: String,
    pub resource: String,
    pub origin_hash: String,
    pub network: String,
    pub asset: Option<String>,
    pub pay_to: String,
    #[serde(default)]
    pub intent_uid: Option<String>,
    #[serde(default)]
    pub cart_uid: Option<String>,
    #[serde(default)]
    pub payment_uid: Option<String>,
    #[serde(default)]
    pub trace_uid: Option<String>,
    #[serde(default)]
    pub not_before: Option<u64>,
    #[serde(default)]
    pub not_after: Option<u64>,
    #[serde(default)]
    pub exp: Option<String>,
    #[serde(default)]
    pub sig: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceDecodeError {
    #[error("evidence is not valid base64")]
    InvalidBase64,
    #[error("evidence does not decode to valid JSON matching the evidence shape: {0}")]
    InvalidShape(#[from] serde_json::Error),
}

impl AP2Evidence {
    /// Decodes evidence from a base64-encoded source — either the decoded
    /// `mr`-referenced body field or a standalone base64 blob, per spec.md
    /// §4.4 step 2 ("base64-decode either the header or body field").
    pub fn decode_base64(value: &str) -> Result<Self, EvidenceDecodeError> {
        let bytes = STANDARD
            .decode(value)
            .map_err(|_| EvidenceDecodeError::InvalidBase64)?;
        let evidence: AP2Evidence = serde_json::from_slice(&bytes)?;
        Ok(evidence)
    }

    pub fn from_json_value(value: &Value) -> Result<Self, EvidenceDecodeError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_minimal_evidence() {
        let body = json!({
            "version": 1,
            "paymentHash": "0xabc",
            "resource": "https://merchant.example/item",
            "originHash": "0xdef",
            "network": "base-sepolia",
            "payTo": "0x0000000000000000000000000000000000000001",
        });
        let encoded = STANDARD.encode(serde_json::to_vec(&body).unwrap());
        let evidence = AP2Evidence::decode_base64(&encoded).unwrap();
        assert_eq!(evidence.network, "base-sepolia");
        assert!(evidence.sig.is_none());
    }

    #[test]
    fn rejects_non_base64_input() {
        assert!(AP2Evidence::decode_base64("not base64!!!").is_err());
    }
}
