//! Deterministic JSON serialization used for payment-hash and origin-hash binding.
//!
//! Canonical form: sorted object keys, no insignificant whitespace, UTF-8.
//! `serde_json::Value` objects are backed by a `BTreeMap` (this crate does not
//! enable the `preserve_order` feature), so `serde_json::to_vec` already
//! serializes keys in sorted order at every nesting level; this module only
//! gives that fact a name so call sites document intent.

use serde::Serialize;

/// Serializes a value to its canonical JSON byte representation:
/// sorted keys, no whitespace, UTF-8.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let as_value = serde_json::to_value(value)?;
    serde_json::to_vec(&as_value)
}

/// Serializes a value to its canonical JSON string representation.
pub fn canonical_json_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    canonical_json_bytes(value)
        .map(|bytes| String::from_utf8(bytes).expect("canonical JSON is valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_regardless_of_input_order() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let b = json!({"a": 2, "c": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(
            canonical_json_string(&a).unwrap(),
            canonical_json_string(&b).unwrap()
        );
    }

    #[test]
    fn has_no_insignificant_whitespace() {
        let v = json!({"a": 1, "b": [1, 2, 3]});
        let s = canonical_json_string(&v).unwrap();
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn reordering_keys_changes_nothing_but_reordering_values_changes_hash() {
        use alloy_primitives::keccak256;
        let a = canonical_json_bytes(&json!({"x": 1, "y": 2})).unwrap();
        let b = canonical_json_bytes(&json!({"y": 2, "x": 1})).unwrap();
        assert_eq!(keccak256(&a), keccak256(&b));
        let c = canonical_json_bytes(&json!({"x": 2, "y": 1})).unwrap();
        assert_ne!(keccak256(&a), keccak256(&c));
    }
}
