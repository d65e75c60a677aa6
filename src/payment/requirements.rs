//! Protocol-agnostic `PaymentRequirements` (spec.md §3, §4.4, §4.5).
//!
//! Unlike `v1::PaymentRequirements<TScheme, TAmount, TAddress, TExtra>`
//! (a statically-typed generic over a single scheme family), this gateway never
//! interprets requirements beyond the handful of fields AP2 verification and
//! sanitization touch — every other field, and the entire shape of `extra`, is
//! opaque JSON that is forwarded (or stripped) as-is. A `serde_json::Value` with
//! typed accessors keeps that contract honest instead of forcing a schema the
//! gateway doesn't actually own.

use serde_json::{Map, Value};

/// A `paymentRequirements` document, treated as opaque JSON with a few named
/// accessors for the fields this gateway's logic depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequirements(pub Value);

// serde can't derive directly over a bare `Value` tuple struct the way we
// want transparent (de)serialization, so implement it by hand.
mod serde_impl {
    use super::PaymentRequirements;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    impl Serialize for PaymentRequirements {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for PaymentRequirements {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            Ok(PaymentRequirements(Value::deserialize(deserializer)?))
        }
    }
}

impl PaymentRequirements {
    pub fn resource(&self) -> Option<&str> {
        self.0.get("resource").and_then(Value::as_str)
    }

    pub fn network(&self) -> Option<&str> {
        self.0.get("network").and_then(Value::as_str)
    }

    pub fn pay_to(&self) -> Option<&str> {
        self.0.get("payTo").and_then(Value::as_str)
    }

    pub fn asset(&self) -> Option<&str> {
        self.0.get("asset").and_then(Value::as_str)
    }

    pub fn max_amount_required(&self) -> Option<&str> {
        self.0.get("maxAmountRequired").and_then(Value::as_str)
    }

    pub fn extra(&self) -> Option<&Value> {
        self.0.get("extra")
    }

    /// `paymentRequirements.extra.ap2`, the root of `AP2Policy` extraction
    /// (spec.md §4.4 step 1).
    pub fn ap2_policy_value(&self) -> Option<&Value> {
        self.extra()?.get("ap2")
    }

    /// Sanitizes for forwarding to the upstream facilitator (spec.md §4.5
    /// step 6): inside `extra`, retain only `{name, version}`; drop
    /// null-valued top-level fields entirely.
    pub fn sanitize(&self) -> PaymentRequirements {
        let Value::Object(original) = &self.0 else {
            return self.clone();
        };

        let mut sanitized = Map::new();
        for (key, value) in original {
            if value.is_null() {
                continue;
            }
            if key == "extra" {
                let mut extra = Map::new();
                if let Some(name) = value.get("name") {
                    extra.insert("name".to_string(), name.clone());
                }
                if let Some(version) = value.get("version") {
                    extra.insert("version".to_string(), version.clone());
                }
                sanitized.insert("extra".to_string(), Value::Object(extra));
            } else {
                sanitized.insert(key.clone(), value.clone());
            }
        }
        PaymentRequirements(Value::Object(sanitized))
    }
}

impl From<Value> for PaymentRequirements {
    fn from(value: Value) -> Self {
        PaymentRequirements(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_keeps_only_name_and_version_in_extra() {
        let pr = PaymentRequirements(json!({
            "resource": "https://merchant.example/item",
            "description": null,
            "extra": {"name": "USDC", "version": "2", "ap2": {"requireTrace": true}}
        }));
        let sanitized = pr.sanitize();
        assert_eq!(
            sanitized.0.get("extra"),
            Some(&json!({"name": "USDC", "version": "2"}))
        );
        assert!(sanitized.0.get("description").is_none());
        assert_eq!(
            sanitized.0.get("resource"),
            Some(&json!("https://merchant.example/item"))
        );
    }

    #[test]
    fn ap2_policy_value_reads_through_extra() {
        let pr = PaymentRequirements(json!({
            "extra": {"ap2": {"requireTrace": true}}
        }));
        assert_eq!(pr.ap2_policy_value(), Some(&json!({"requireTrace": true})));
    }
}
