//! EIP-712 evidence-signature recovery (spec.md §4.4 step 9).
//!
//! Follows the `SignedMessage::extract`/`eip712_signing_hash` pattern used
//! elsewhere for EIP-712 payment authorizations: a `sol!`-defined typed-data
//! struct, a domain built with `eip712_domain!`, and `Signature::recover_address_from_prehash`
//! against the struct hash. The struct is fixed at the original contract's 12
//! fields, in its exact name/type/order — `encodeType`/`typeHash` is computed
//! over the literal field list, so any deviation recovers against a different
//! hash than whatever signed the reference typed data.

use alloy_primitives::{address, Address, Signature, B256};
use alloy_sol_types::{eip712_domain, sol, SolStruct};

use super::evidence::AP2Evidence;

sol! {
    /// The EIP-712 typed-data struct this gateway asks a mandate signer to
    /// have signed over.
    #[derive(Debug)]
    struct Evidence {
        bytes32 paymentHash;
        string resource;
        bytes32 originHash;
        string network;
        address asset;
        address payTo;
        bytes32 intent_uid;
        bytes32 cart_uid;
        bytes32 payment_uid;
        bytes32 trace_uid;
        uint64 notBefore;
        uint64 notAfter;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Eip712Error {
    #[error("evidence.payTo is not a valid address")]
    InvalidPayTo,
    #[error("evidence field is not valid 32-byte hex: {0}")]
    InvalidHexField(&'static str),
    #[error("evidence.sig is not valid hex")]
    InvalidSignatureHex,
    #[error("evidence.sig has an unsupported length (expected 64 or 65 bytes)")]
    UnsupportedSignatureLength,
    #[error("signature recovery failed")]
    RecoveryFailed,
}

fn parse_b256(field_name: &'static str, hex_str: &str) -> Result<B256, Eip712Error> {
    let trimmed = hex_str.trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|_| Eip712Error::InvalidHexField(field_name))?;
    if bytes.len() != 32 {
        return Err(Eip712Error::InvalidHexField(field_name));
    }
    Ok(B256::from_slice(&bytes))
}

fn parse_address(hex_str: &str) -> Result<Address, Eip712Error> {
    hex_str.parse().map_err(|_| Eip712Error::InvalidPayTo)
}

/// Recovers the signer address from `evidence.sig`, built over the EIP-712
/// domain `{name: "AP2Evidence", version: "1", chainId, verifyingContract: evidence.payTo}`.
pub fn recover_signer(evidence: &AP2Evidence, chain_id: u64) -> Result<Address, Eip712Error> {
    let pay_to = parse_address(&evidence.pay_to)?;
    let asset = evidence
        .asset
        .as_deref()
        .map(parse_address)
        .transpose()?
        .unwrap_or(address!("0000000000000000000000000000000000000000"));

    let typed = Evidence {
        paymentHash: parse_b256("paymentHash", &evidence.payment_hash)?,
        resource: evidence.resource.clone(),
        originHash: parse_b256("originHash", &evidence.origin_hash)?,
        network: evidence.network.clone(),
        asset,
        payTo: pay_to,
        intent_uid: evidence
            .intent_uid
            .as_deref()
            .map(|v| parse_b256("intent_uid", v))
            .transpose()?
            .unwrap_or_default(),
        cart_uid: evidence
            .cart_uid
            .as_deref()
            .map(|v| parse_b256("cart_uid", v))
            .transpose()?
            .unwrap_or_default(),
        payment_uid: evidence
            .payment_uid
            .as_deref()
            .map(|v| parse_b256("payment_uid", v))
            .transpose()?
            .unwrap_or_default(),
        trace_uid: evidence
            .trace_uid
            .as_deref()
            .map(|v| parse_b256("trace_uid", v))
            .transpose()?
            .unwrap_or_default(),
        notBefore: evidence.not_before.unwrap_or(0),
        notAfter: evidence.not_after.unwrap_or(0),
    };

    let domain = eip712_domain! {
        name: "AP2Evidence",
        version: "1",
        chain_id: chain_id,
        verifying_contract: pay_to,
    };
    let signing_hash = typed.eip712_signing_hash(&domain);

    let sig_hex = evidence
        .sig
        .as_deref()
        .ok_or(Eip712Error::RecoveryFailed)?
        .trim_start_matches("0x");
    let sig_bytes = hex::decode(sig_hex).map_err(|_| Eip712Error::InvalidSignatureHex)?;
    let signature = match sig_bytes.len() {
        65 => Signature::from_raw(&sig_bytes).map_err(|_| Eip712Error::RecoveryFailed)?,
        64 => Signature::from_erc2098(&sig_bytes),
        _ => return Err(Eip712Error::UnsupportedSignatureLength),
    };

    signature
        .recover_address_from_prehash(&signing_hash)
        .map_err(|_| Eip712Error::RecoveryFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_evidence() -> AP2Evidence {
        AP2Evidence {
            version: 1,
            payment_hash: "0x".to_string() + &"ab".repeat(32),
            resource: "https://merchant.example/item".to_string(),
            origin_hash: "0x".to_string() + &"cd".repeat(32),
            network: "base-sepolia".to_string(),
            asset: Some("0x0000000000000000000000000000000000000001".to_string()),
            pay_to: "0x0000000000000000000000000000000000000002".to_string(),
            intent_uid: None,
            cart_uid: None,
            payment_uid: None,
            trace_uid: None,
            not_before: None,
            not_after: None,
            exp: None,
            sig: None,
            kid: None,
        }
    }

    #[test]
    fn missing_signature_is_recovery_failure() {
        let evidence = base_evidence();
        let err = recover_signer(&evidence, 84532).unwrap_err();
        assert!(matches!(err, Eip712Error::RecoveryFailed));
    }

    #[test]
    fn invalid_pay_to_is_rejected() {
        let mut evidence = base_evidence();
        evidence.pay_to = "not-an-address".to_string();
        assert!(matches!(
            recover_signer(&evidence, 84532),
            Err(Eip712Error::InvalidPayTo)
        ));
    }

    #[test]
    fn malformed_signature_length_is_rejected() {
        let mut evidence = base_evidence();
        evidence.sig = Some("0xabcd".to_string());
        assert!(matches!(
            recover_signer(&evidence, 84532),
            Err(Eip712Error::UnsupportedSignatureLength)
        ));
    }
}
