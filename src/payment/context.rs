//! `PaymentContext`: the protocol-agnostic envelope derived from `X-PAYMENT`
//! (spec.md §3, §4.5 step 3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{protocol, version, network, payload, headers?, extra?}`, built from the
/// base64-decoded `X-PAYMENT` payload (authoritative) or, as fallback, the
/// parsed request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentContext {
    pub protocol: String,
    #[serde(default)]
    pub version: Option<Value>,
    pub network: String,
    pub payload: Value,
    #[serde(default)]
    pub headers: Option<Value>,
    #[serde(default)]
    pub extra: Option<Value>,
}

impl PaymentContext {
    /// Builds a `PaymentContext` from an already-decoded `X-PAYMENT` JSON
    /// value. `protocol` is tagged `payload.protocol || payload.scheme`.
    pub fn from_payment_payload(decoded: &Value) -> Option<Self> {
        let protocol = decoded
            .get("protocol")
            .or_else(|| decoded.get("scheme"))
            .and_then(Value::as_str)?
            .to_string();
        let network = decoded.get("network").and_then(Value::as_str)?.to_string();
        let payload = decoded.get("payload").cloned().unwrap_or(Value::Null);
        Some(PaymentContext {
            protocol,
            version: decoded.get("x402Version").cloned(),
            network,
            payload,
            headers: None,
            extra: decoded.get("extra").cloned(),
        })
    }

    /// `payload.authorization.from` (the payer), used by AP2 congruence and
    /// amount checks (spec.md §4.4 steps 9-10).
    pub fn authorization_from(&self) -> Option<&str> {
        self.payload.get("authorization")?.get("from")?.as_str()
    }

    pub fn authorization_to(&self) -> Option<&str> {
        self.payload.get("authorization")?.get("to")?.as_str()
    }

    pub fn authorization_value(&self) -> Option<&str> {
        self.payload.get("authorization")?.get("value")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_from_payload_with_protocol_field() {
        let decoded = json!({
            "protocol": "eip3009",
            "network": "base-sepolia",
            "payload": {"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}
        });
        let ctx = PaymentContext::from_payment_payload(&decoded).unwrap();
        assert_eq!(ctx.protocol, "eip3009");
        assert_eq!(ctx.authorization_from(), Some("0xabc"));
        assert_eq!(ctx.authorization_value(), Some("1000000"));
    }

    #[test]
    fn falls_back_to_scheme_when_protocol_absent() {
        let decoded = json!({"scheme": "x402:exact", "network": "base", "payload": {}});
        let ctx = PaymentContext::from_payment_payload(&decoded).unwrap();
        assert_eq!(ctx.protocol, "x402:exact");
    }

    #[test]
    fn returns_none_when_network_missing() {
        let decoded = json!({"protocol": "eip3009", "payload": {}});
        assert!(PaymentContext::from_payment_payload(&decoded).is_none());
    }
}
