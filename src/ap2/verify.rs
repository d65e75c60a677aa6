//! The AP2 verification pipeline (spec.md §4.4): ten ordered checks, any of
//! which aborts with a specific error code. Order matters because it's part
//! of the observable contract (a request failing multiple checks reports the
//! first).

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::ErrorCode;
use crate::payment::{PaymentContext, PaymentRequirements};
use crate::util::canonical_json::canonical_json_bytes;

use super::eip712;
use super::evidence::AP2Evidence;
use super::policy::AP2Policy;

pub struct Ap2Outcome {
    pub evidence: AP2Evidence,
    pub used_mandate: bool,
}

/// `Ok(None)` means no evidence was presented and the policy didn't require
/// any — verification is a no-op per the collapsed rule (SPEC_FULL.md Open
/// Question 3: "if evidence is present on any endpoint, verify fully").
pub fn verify(
    payment_requirements: &PaymentRequirements,
    payment_context: &PaymentContext,
    full_payment_payload: &serde_json::Value,
    raw_payment_header: Option<&str>,
    evidence_base64: Option<&str>,
    origin_header: Option<&str>,
    network_chain_ids: &HashMap<String, u64>,
) -> Result<Option<Ap2Outcome>, (ErrorCode, String)> {
    // 1. Policy extraction.
    let policy = match payment_requirements.ap2_policy_value() {
        Some(value) => AP2Policy::extract(value)
            .map_err(|e| (ErrorCode::Ap2EvidenceInvalid, format!("invalid ap2 policy: {e}")))?,
        None => AP2Policy::default(),
    };

    // 2. Evidence decode.
    let Some(evidence_base64) = evidence_base64 else {
        if policy.requires_any_mandate() || policy.require_trace {
            return Err((
                ErrorCode::Ap2EvidenceMissing,
                "policy requires mandate evidence but none was presented".to_string(),
            ));
        }
        return Ok(None);
    };
    let evidence = AP2Evidence::decode_base64(evidence_base64)
        .map_err(|e| (ErrorCode::Ap2EvidenceInvalid, e.to_string()))?;

    // 3. Flag enforcement.
    check_required_uid(policy.require_intent_mandate, &evidence.intent_uid, "intent_uid")?;
    check_required_uid(policy.require_cart_mandate, &evidence.cart_uid, "cart_uid")?;
    check_required_uid(policy.require_payment_mandate, &evidence.payment_uid, "payment_uid")?;
    check_required_uid(policy.require_trace, &evidence.trace_uid, "trace_uid")?;

    // 4. Congruence.
    if let Some(resource) = payment_requirements.resource() {
        if evidence.resource != resource {
            return Err((ErrorCode::Ap2ResourceMismatch, "resource mismatch".to_string()));
        }
    }
    if let Some(network) = payment_requirements.network() {
        if evidence.network != network {
            return Err((ErrorCode::Ap2NetworkMismatch, "network mismatch".to_string()));
        }
    }
    if let Some(pay_to) = payment_requirements.pay_to() {
        if !evidence.pay_to.eq_ignore_ascii_case(pay_to) {
            return Err((ErrorCode::Ap2PaytoMismatch, "payTo mismatch".to_string()));
        }
    }
    if let Some(asset) = payment_requirements.asset() {
        if let Some(evidence_asset) = &evidence.asset {
            if !evidence_asset.eq_ignore_ascii_case(asset) {
                return Err((ErrorCode::Ap2AssetMismatch, "asset mismatch".to_string()));
            }
        }
    }

    // 5. Temporal.
    let now = crate::timestamp::UnixTimestamp::try_now()
        .map_err(|_| (ErrorCode::Unspecified, "clock error".to_string()))?
        .seconds_since_epoch();
    if let Some(not_before) = evidence.not_before {
        if now < not_before {
            return Err((ErrorCode::Ap2TtlNotBefore, "evidence not yet valid".to_string()));
        }
    }
    if let Some(not_after) = evidence.not_after {
        if now > not_after {
            return Err((ErrorCode::Ap2TtlExpired, "evidence expired".to_string()));
        }
    }
    if let Some(exp) = &evidence.exp {
        let parsed = chrono::DateTime::parse_from_rfc3339(exp)
            .map_err(|_| (ErrorCode::Ap2TtlExpired, "exp is not valid ISO-8601".to_string()))?;
        if now as i64 > parsed.timestamp() {
            return Err((ErrorCode::Ap2TtlExpired, "evidence expired (exp)".to_string()));
        }
    }

    // 6. Origin binding.
    let origin = match origin_header {
        Some(origin) => origin.to_string(),
        None => scheme_and_authority(payment_requirements.resource().unwrap_or_default()),
    };
    let normalized = origin.trim().to_lowercase();
    let computed_hash = Sha256::digest(normalized.as_bytes());
    let expected_hash = strip_0x(&evidence.origin_hash);
    if hex::encode(computed_hash) != expected_hash.to_lowercase() {
        return Err((ErrorCode::Ap2OriginMismatch, "origin hash mismatch".to_string()));
    }

    // 7. Payment-hash binding. The fallback hashes the *full* payment-payload
    // document (spec.md §4.4 step 7: `base64(canonical_json(paymentPayload))`),
    // not just its inner `payload` field.
    let header_bytes: Vec<u8> = if let Some(raw) = raw_payment_header {
        raw.as_bytes().to_vec()
    } else {
        let canonical = canonical_json_bytes(full_payment_payload)
            .map_err(|_| (ErrorCode::Ap2PaymentHashMismatch, "failed to canonicalize payload".to_string()))?;
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, canonical).into_bytes()
    };
    let expected_payment_hash = alloy_primitives::keccak256(&header_bytes);
    if hex::encode(expected_payment_hash) != strip_0x(&evidence.payment_hash).to_lowercase() {
        return Err((
            ErrorCode::Ap2PaymentHashMismatch,
            "payment hash mismatch".to_string(),
        ));
    }

    // 8. Merchant identity.
    if let Some(accepted) = &policy.accepted_merchant_ids {
        let host = host_without_port(payment_requirements.resource().unwrap_or_default());
        let matches = accepted
            .iter()
            .any(|id| id.strip_prefix("did:web:").map(|h| h == host).unwrap_or(false));
        if !matches {
            return Err((ErrorCode::Ap2MerchantDenied, "merchant not in accepted list".to_string()));
        }
    }

    // 9. Optional EIP-712 signature.
    let mut used_mandate = policy.requires_any_mandate();
    if evidence.sig.is_some() {
        let network = payment_requirements
            .network()
            .unwrap_or(&evidence.network)
            .to_string();
        let chain_id = network_chain_ids.get(&network).copied().ok_or_else(|| {
            (
                ErrorCode::Ap2ChainUnsupported,
                format!("no chainId configured for network '{network}'"),
            )
        })?;
        // `RecoveryFailed` means a present, well-formed signature didn't
        // recover — a cryptographically invalid signature, not an
        // unavailable verification capability (`Ap2SigUnavailable` is
        // reserved for when this environment genuinely cannot check a
        // signature at all, which never holds here: `alloy` is always
        // compiled in).
        let recovered = eip712::recover_signer(&evidence, chain_id)
            .map_err(|e| (ErrorCode::Ap2SigInvalid, e.to_string()))?;
        if let Some(payer) = payment_context.authorization_from() {
            if !format!("{recovered:#x}").eq_ignore_ascii_case(payer) {
                return Err((
                    ErrorCode::Ap2SigPayerMismatch,
                    "recovered signer does not match payer".to_string(),
                ));
            }
        }
        used_mandate = true;
    }

    // 10. Amount.
    if let (Some(value), Some(max_amount)) = (
        payment_context.authorization_value(),
        payment_requirements.max_amount_required(),
    ) {
        if let (Ok(value), Ok(max_amount)) = (value.parse::<u128>(), max_amount.parse::<u128>()) {
            if value > max_amount {
                return Err((
                    ErrorCode::Ap2AmountExceeded,
                    "authorization value exceeds maxAmountRequired".to_string(),
                ));
            }
        }
    }

    Ok(Some(Ap2Outcome {
        evidence,
        used_mandate,
    }))
}

fn check_required_uid(required: bool, uid: &Option<String>, field: &'static str) -> Result<(), (ErrorCode, String)> {
    if !required {
        return Ok(());
    }
    match uid {
        Some(value) if !value.trim().is_empty() && value.trim_start_matches("0x").chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(())
        }
        _ => Err((
            ErrorCode::Ap2EvidenceInvalid,
            format!("policy requires {field} but it is missing or not hex"),
        )),
    }
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn scheme_and_authority(resource: &str) -> String {
    Url::parse(resource)
        .map(|u| format!("{}://{}", u.scheme(), u.authority()))
        .unwrap_or_default()
}

fn host_without_port(resource: &str) -> String {
    Url::parse(resource)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;

    fn requirements(extra: serde_json::Value) -> PaymentRequirements {
        PaymentRequirements(json!({
            "resource": "https://merchant.example/item",
            "network": "base-sepolia",
            "payTo": "0x0000000000000000000000000000000000000002",
            "maxAmountRequired": "1000000",
            "extra": extra
        }))
    }

    fn full_payload(inner: serde_json::Value) -> serde_json::Value {
        json!({
            "protocol": "eip3009",
            "network": "base-sepolia",
            "payload": inner,
        })
    }

    fn context() -> PaymentContext {
        PaymentContext::from_payment_payload(&full_payload(
            json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}),
        ))
        .unwrap()
    }

    fn evidence_base64(origin: &str, payment_hash_source: &[u8]) -> String {
        let origin_hash = hex::encode(Sha256::digest(origin.trim().to_lowercase().as_bytes()));
        let payment_hash = hex::encode(alloy_primitives::keccak256(payment_hash_source));
        let evidence = json!({
            "version": 1,
            "paymentHash": format!("0x{payment_hash}"),
            "resource": "https://merchant.example/item",
            "originHash": format!("0x{origin_hash}"),
            "network": "base-sepolia",
            "payTo": "0x0000000000000000000000000000000000000002",
        });
        STANDARD.encode(serde_json::to_vec(&evidence).unwrap())
    }

    #[test]
    fn no_evidence_and_no_requirement_is_a_no_op() {
        let doc = full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}));
        let result = verify(
            &requirements(json!({})),
            &context(),
            &doc,
            None,
            None,
            Some("https://merchant.example"),
            &HashMap::new(),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn succeeds_when_origin_and_payment_hash_match() {
        let doc = full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}));
        let canonical = canonical_json_bytes(&doc).unwrap();
        let header_bytes = STANDARD.encode(canonical).into_bytes();
        let evidence = evidence_base64("https://merchant.example", &header_bytes);
        let result = verify(
            &requirements(json!({})),
            &context(),
            &doc,
            None,
            Some(&evidence),
            Some("https://merchant.example"),
            &HashMap::new(),
        )
        .unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn fails_on_origin_mismatch() {
        let doc = full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}));
        let canonical = canonical_json_bytes(&doc).unwrap();
        let header_bytes = STANDARD.encode(canonical).into_bytes();
        let evidence = evidence_base64("https://evil.example", &header_bytes);
        let err = verify(
            &requirements(json!({})),
            &context(),
            &doc,
            None,
            Some(&evidence),
            Some("https://merchant.example"),
            &HashMap::new(),
        )
        .unwrap_err();
        assert_eq!(err.0, ErrorCode::Ap2OriginMismatch);
    }

    #[test]
    fn fails_on_amount_overflow() {
        let original_doc =
            full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}));
        let canonical = canonical_json_bytes(&original_doc).unwrap();
        let header_bytes = STANDARD.encode(canonical).into_bytes();
        let evidence = evidence_base64("https://merchant.example", &header_bytes);
        let overflowing_doc =
            full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000001"}}));
        let ctx = PaymentContext::from_payment_payload(&overflowing_doc).unwrap();
        let err = verify(
            &requirements(json!({})),
            &ctx,
            &overflowing_doc,
            None,
            Some(&evidence),
            Some("https://merchant.example"),
            &HashMap::new(),
        );
        // Payment hash was computed over the original document, so this
        // should fail payment-hash binding before ever reaching amount.
        assert_eq!(err.unwrap_err().0, ErrorCode::Ap2PaymentHashMismatch);
    }

    #[test]
    fn fails_on_amount_exceeded_when_hash_matches_overflowing_payload() {
        let doc = full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000001"}}));
        let ctx = PaymentContext::from_payment_payload(&doc).unwrap();
        let canonical = canonical_json_bytes(&doc).unwrap();
        let header_bytes = STANDARD.encode(canonical).into_bytes();
        let evidence = evidence_base64("https://merchant.example", &header_bytes);
        let err = verify(
            &requirements(json!({})),
            &ctx,
            &doc,
            None,
            Some(&evidence),
            Some("https://merchant.example"),
            &HashMap::new(),
        )
        .unwrap_err();
        assert_eq!(err.0, ErrorCode::Ap2AmountExceeded);
    }

    #[test]
    fn missing_required_mandate_is_rejected() {
        let doc = full_payload(json!({"authorization": {"from": "0xabc", "to": "0xdef", "value": "1000000"}}));
        let result = verify(
            &requirements(json!({"ap2": {"requireIntentMandate": true}})),
            &context(),
            &doc,
            None,
            None,
            Some("https://merchant.example"),
            &HashMap::new(),
        );
        let err = result.unwrap_err();
        assert_eq!(err.0, ErrorCode::Ap2EvidenceMissing);
    }
}
