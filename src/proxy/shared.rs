//! Request plumbing shared by `/x402/verify` and `/x402/settle` (spec.md
//! §4.5): header parsing, `PaymentContext` construction, and the optional
//! AP2 check that now applies to both endpoints (Open Question 3).

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::ap2;
use crate::error::{ErrorCode, GatewayError};
use crate::headers::{evidence_header, payment_secure, risk_ids};
use crate::payment::{PaymentContext, PaymentRequirements};
use crate::request_id::RequestId;
use crate::state::SharedState;
use crate::trace_context::TraceContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequestBody {
    pub x402_version: Value,
    pub payment_payload: Value,
    pub payment_requirements: Value,
    /// `base64(JSON Evidence)`, carried in the body rather than a header
    /// because the AP2 evidence document is typically too large for a
    /// header value. `X-AP2-EVIDENCE` is a separate, much smaller
    /// content-addressed reference to a mandate (see `mandate` below) and
    /// is never itself the evidence blob.
    #[serde(default)]
    pub ap2_evidence_header: Option<String>,
}

pub struct ParsedRequest {
    pub sid: Uuid,
    pub tid: Option<Uuid>,
    pub trace_context: TraceContext,
    pub payment_context: PaymentContext,
    /// The full payment-payload document `payment_context` was derived from
    /// (the decoded `X-PAYMENT` header, or `body.payment_payload` as
    /// fallback) — distinct from `payment_context.payload`, which is only
    /// its inner `.payload` field. AP2 payment-hash binding (spec.md §4.4
    /// step 7) hashes this whole document, not the inner field.
    pub full_payment_payload: Value,
    pub payment_requirements: PaymentRequirements,
    pub raw_payment_header: Option<String>,
    pub evidence_base64: Option<String>,
    /// The `mandate` object forwarded to `/risk/evaluate`, built from the
    /// `X-AP2-EVIDENCE` header's `mr`/`ms`/`mt`/`sz` fields when present.
    pub mandate: Option<Value>,
    pub origin: Option<String>,
}

pub fn parse_request(
    headers: &HeaderMap,
    body: &FacilitatorRequestBody,
    request_id: &RequestId,
) -> Result<ParsedRequest, GatewayError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let sid = risk_ids::parse_sid(header_str("x-risk-session"))
        .map_err(|e| GatewayError::new(ErrorCode::RiskSessionInvalid, e.to_string(), request_id.clone()))?;
    let header_tid = risk_ids::parse_tid(header_str("x-risk-trace"))
        .map_err(|e| GatewayError::new(ErrorCode::RiskTraceInvalid, e.to_string(), request_id.clone()))?;

    let payment_secure_value = header_str("x-payment-secure").ok_or_else(|| {
        GatewayError::new(
            ErrorCode::TraceHeaderInvalid,
            "X-PAYMENT-SECURE is required",
            request_id.clone(),
        )
    })?;
    let trace_context = payment_secure::parse(payment_secure_value).map_err(|e| {
        let code = match e {
            crate::headers::HeaderError::PaymentSecureUnsupported(_) => {
                ErrorCode::TraceHeaderUnsupported
            }
            _ => ErrorCode::TraceHeaderInvalid,
        };
        GatewayError::new(code, e.to_string(), request_id.clone())
    })?;
    let tid = header_tid.or_else(|| {
        trace_context
            .resolve_tid(None)
            .and_then(|s| Uuid::parse_str(&s).ok())
    });

    let raw_payment_header = header_str("x-payment").map(str::to_string);
    let full_payment_payload = match &raw_payment_header {
        Some(raw) => {
            let decoded = STANDARD.decode(raw).map_err(|_| {
                GatewayError::new(
                    ErrorCode::TraceHeaderInvalid,
                    "X-PAYMENT is not valid base64",
                    request_id.clone(),
                )
            })?;
            serde_json::from_slice(&decoded).map_err(|_| {
                GatewayError::new(
                    ErrorCode::TraceHeaderInvalid,
                    "X-PAYMENT does not decode to JSON",
                    request_id.clone(),
                )
            })?
        }
        None => body.payment_payload.clone(),
    };
    let payment_context = PaymentContext::from_payment_payload(&full_payment_payload).ok_or_else(|| {
        GatewayError::new(
            ErrorCode::TraceHeaderInvalid,
            "could not construct a payment context from X-PAYMENT or the request body",
            request_id.clone(),
        )
    })?;

    let mandate = match header_str("x-ap2-evidence") {
        Some(raw) => {
            let parsed = evidence_header::parse(raw).map_err(|e| {
                let code = match e {
                    crate::headers::HeaderError::EvidenceUnsupported(_) => {
                        ErrorCode::EvidenceHeaderUnsupported
                    }
                    _ => ErrorCode::EvidenceHeaderInvalid,
                };
                GatewayError::new(code, e.to_string(), request_id.clone())
            })?;
            Some(parsed.to_mandate_json())
        }
        None => None,
    };

    // The AP2 evidence document itself always arrives in the body: it is
    // too large to fit comfortably in a header, and `X-AP2-EVIDENCE` names
    // a mandate reference rather than carrying the evidence inline.
    let evidence_base64 = body.ap2_evidence_header.clone();

    let origin = header_str("origin").map(str::to_string);

    Ok(ParsedRequest {
        sid,
        tid,
        trace_context,
        payment_context,
        full_payment_payload,
        payment_requirements: PaymentRequirements(body.payment_requirements.clone()),
        raw_payment_header,
        evidence_base64,
        mandate,
        origin,
    })
}

/// Runs AP2 verification when evidence is present, regardless of endpoint
/// (the collapsed, stricter rule from SPEC_FULL.md Open Question 3).
pub fn maybe_verify_ap2(
    state: &SharedState,
    parsed: &ParsedRequest,
    request_id: &RequestId,
) -> Result<bool, GatewayError> {
    let network_chain_ids = state.config.network_chain_ids();
    match ap2::verify(
        &parsed.payment_requirements,
        &parsed.payment_context,
        &parsed.full_payment_payload,
        parsed.raw_payment_header.as_deref(),
        parsed.evidence_base64.as_deref(),
        parsed.origin.as_deref(),
        &network_chain_ids,
    ) {
        Ok(Some(outcome)) => Ok(outcome.used_mandate),
        Ok(None) => Ok(false),
        Err((code, message)) => Err(GatewayError::new(code, message, request_id.clone())),
    }
}
