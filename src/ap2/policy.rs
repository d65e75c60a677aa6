//! `AP2Policy` extraction from `paymentRequirements.extra.ap2` (spec.md §3,
//! §4.4 step 1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AP2Policy {
    #[serde(default)]
    pub require_intent_mandate: bool,
    #[serde(default)]
    pub require_cart_mandate: bool,
    #[serde(default)]
    pub require_payment_mandate: bool,
    #[serde(default)]
    pub require_trace: bool,
    #[serde(default)]
    pub accepted_merchant_ids: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
#[error("paymentRequirements.extra.ap2 is structurally invalid: {0}")]
pub struct PolicyExtractionError(#[from] serde_json::Error);

impl AP2Policy {
    /// Parses `paymentRequirements.extra.ap2`. Absence of the `ap2` block
    /// entirely is represented by the caller as "no policy" (all flags
    /// false); this function only handles the case where the block exists
    /// but its shape is wrong.
    pub fn extract(ap2_value: &Value) -> Result<Self, PolicyExtractionError> {
        Ok(serde_json::from_value(ap2_value.clone())?)
    }

    pub fn requires_any_mandate(&self) -> bool {
        self.require_intent_mandate || self.require_cart_mandate || self.require_payment_mandate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_all_false() {
        let policy = AP2Policy::extract(&json!({})).unwrap();
        assert!(!policy.require_trace);
        assert!(policy.accepted_merchant_ids.is_none());
    }

    #[test]
    fn parses_accepted_merchant_ids() {
        let policy = AP2Policy::extract(&json!({
            "requireTrace": true,
            "acceptedMerchantIds": ["did:web:merchant.example"]
        }))
        .unwrap();
        assert!(policy.require_trace);
        assert_eq!(
            policy.accepted_merchant_ids,
            Some(vec!["did:web:merchant.example".to_string()])
        );
    }

    #[test]
    fn rejects_structural_violation() {
        let err = AP2Policy::extract(&json!({"requireTrace": "not-a-bool"}));
        assert!(err.is_err());
    }
}
