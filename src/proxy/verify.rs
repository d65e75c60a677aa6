//! `POST /x402/verify` (spec.md §4.5): the facilitator proxy's verification
//! endpoint. Parses headers, gates on a risk decision, validates AP2
//! evidence when present, sanitizes `paymentRequirements`, and forwards to
//! the upstream facilitator.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::{ErrorCode, GatewayError};
use crate::request_id::RequestId;
use crate::risk::model::{Decision, EvaluateRequest, EvaluateTraceContext};
use crate::state::SharedState;
use crate::util::b64::Base64Bytes;
use crate::util::canonical_json::canonical_json_bytes;

use super::debug::Snapshot;
use super::shared::{self, FacilitatorRequestBody, ParsedRequest};
use super::upstream::UpstreamError;

/// The narrowed response shape returned to the seller (spec.md §4.5):
/// `{isValid, payer, invalidReason?}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

#[instrument(skip_all)]
pub async fn post_verify(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<FacilitatorRequestBody>,
) -> Response {
    handle(&state, &headers, &body, &request_id).await
}

async fn handle(
    state: &SharedState,
    headers: &HeaderMap,
    body: &FacilitatorRequestBody,
    request_id: &RequestId,
) -> Response {
    let parsed = match shared::parse_request(headers, body, request_id) {
        Ok(parsed) => parsed,
        Err(err) => return err.into_response(),
    };

    let decision = match evaluate(state, &parsed, request_id).await {
        Ok(decision) => decision,
        Err(err) => return err.into_response(),
    };

    let risk_headers = risk_response_headers(&decision);

    if matches!(decision.decision, Decision::Deny) {
        let message = format!("Risk denied: {}", decision.reasons.join(", "));
        let err = GatewayError::new(ErrorCode::RiskDenied, message, request_id.clone());
        return with_extra_headers(err.into_response(), &risk_headers);
    }

    if let Err(err) = shared::maybe_verify_ap2(state, &parsed, request_id) {
        return with_extra_headers(err.into_response(), &risk_headers);
    }

    let forward_payload = build_forward_payload(&parsed, body);

    match state.upstream.verify(&forward_payload).await {
        Ok(upstream) => {
            state.debug.set_verify(Snapshot::new(
                &upstream.url,
                upstream.status,
                upstream.body.clone(),
                request_id,
                forward_payload
                    .get("paymentRequirements")
                    .cloned()
                    .unwrap_or(Value::Null),
            ));
            let narrowed = narrow_verify_response(&upstream.body);
            let mut response = (StatusCode::OK, Json(narrowed)).into_response();
            response = with_extra_headers(response, &risk_headers);
            response
        }
        Err(err) => with_extra_headers(upstream_error_response(err, request_id), &risk_headers),
    }
}

async fn evaluate(
    state: &SharedState,
    parsed: &ParsedRequest,
    request_id: &RequestId,
) -> Result<crate::risk::model::RiskDecision, GatewayError> {
    let evaluate_request = EvaluateRequest {
        sid: parsed.sid,
        tid: parsed.tid,
        trace_context: Some(EvaluateTraceContext {
            tp: parsed.trace_context.traceparent.to_string(),
            ts: parsed.trace_context.tracestate.clone(),
        }),
        payment: parsed.payment_context.clone(),
        mandate: parsed.mandate.clone(),
    };
    state
        .evaluator
        .evaluate(evaluate_request)
        .await
        .map_err(|e| e.into_gateway_error(request_id.clone()))
}

/// `{x402Version, paymentPayload, paymentRequirements, paymentHeader}`
/// (spec.md §4.5 step 7): `paymentRequirements` is sanitized, `paymentHeader`
/// is the inbound `X-PAYMENT` verbatim or, failing that, a freshly-canonicalized
/// encoding of the body's `paymentPayload`.
pub fn build_forward_payload(parsed: &ParsedRequest, body: &FacilitatorRequestBody) -> Value {
    let sanitized = parsed.payment_requirements.sanitize();
    let payment_header = parsed.raw_payment_header.clone().unwrap_or_else(|| {
        let canonical = canonical_json_bytes(&body.payment_payload).unwrap_or_default();
        Base64Bytes::encode(canonical).to_string()
    });
    json!({
        "x402Version": body.x402_version,
        "paymentPayload": body.payment_payload,
        "paymentRequirements": sanitized.0,
        "paymentHeader": payment_header,
    })
}

pub fn narrow_verify_response(body: &Value) -> VerifyResponse {
    VerifyResponse {
        is_valid: body
            .get("isValid")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        payer: body
            .get("payer")
            .and_then(Value::as_str)
            .map(str::to_string),
        invalid_reason: body
            .get("invalidReason")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

pub fn risk_response_headers(decision: &crate::risk::model::RiskDecision) -> Vec<(HeaderName, String)> {
    vec![
        (
            HeaderName::from_static("x-risk-decision"),
            decision_label(decision.decision).to_string(),
        ),
        (
            HeaderName::from_static("x-risk-decision-id"),
            decision.decision_id.to_string(),
        ),
        (
            HeaderName::from_static("x-risk-ttl-seconds"),
            decision.ttl_seconds.to_string(),
        ),
    ]
}

pub fn decision_label(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "allow",
        Decision::Deny => "deny",
        Decision::Review => "review",
    }
}

pub fn with_extra_headers(mut response: Response, headers: &[(HeaderName, String)]) -> Response {
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            response.headers_mut().insert(name.clone(), value);
        }
    }
    response
}

pub fn upstream_error_response(error: UpstreamError, request_id: &RequestId) -> Response {
    match error {
        UpstreamError::Status { status, body } => {
            GatewayError::new(ErrorCode::Unspecified, body.to_string(), request_id.clone())
                .with_status(status)
                .into_response()
        }
        UpstreamError::MalformedJson => GatewayError::new(
            ErrorCode::Unspecified,
            "upstream facilitator returned a non-JSON response",
            request_id.clone(),
        )
        .with_status(StatusCode::BAD_GATEWAY)
        .into_response(),
        UpstreamError::Transport(e) => GatewayError::new(
            ErrorCode::Unspecified,
            format!("upstream facilitator request failed: {e}"),
            request_id.clone(),
        )
        .with_status(StatusCode::BAD_GATEWAY)
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrows_upstream_verify_response() {
        let body = json!({"isValid": true, "payer": "0xabc", "extra": "dropped"});
        let narrowed = narrow_verify_response(&body);
        assert!(narrowed.is_valid);
        assert_eq!(narrowed.payer.as_deref(), Some("0xabc"));
        assert!(narrowed.invalid_reason.is_none());
    }

    #[test]
    fn decision_label_matches_wire_strings() {
        assert_eq!(decision_label(Decision::Allow), "allow");
        assert_eq!(decision_label(Decision::Deny), "deny");
        assert_eq!(decision_label(Decision::Review), "review");
    }
}
