//! `POST /x402/settle` (spec.md §4.5): identical gating path to
//! `/x402/verify`, except risk evaluation is governed by the
//! `settle_risk_enabled` flag and the upstream response is narrowed
//! differently.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::{ErrorCode, GatewayError};
use crate::request_id::RequestId;
use crate::risk::model::{Decision, EvaluateRequest, EvaluateTraceContext, RiskDecision};
use crate::state::SharedState;

use super::debug::Snapshot;
use super::shared::{self, FacilitatorRequestBody, ParsedRequest};
use super::verify::{
    build_forward_payload, decision_label, upstream_error_response, with_extra_headers,
};

/// The narrowed response shape returned to the seller (spec.md §4.5):
/// `{success, payer, transaction?, network?, errorReason?}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

#[instrument(skip_all)]
pub async fn post_settle(
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

    let (decision, risk_headers) = match gate(state, &parsed, request_id).await {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    if let Some(decision) = &decision {
        if matches!(decision.decision, Decision::Deny) {
            let message = format!("Risk denied: {}", decision.reasons.join(", "));
            let err = GatewayError::new(ErrorCode::RiskDenied, message, request_id.clone());
            return with_extra_headers(err.into_response(), &risk_headers);
        }
    }

    if let Err(err) = shared::maybe_verify_ap2(state, &parsed, request_id) {
        return with_extra_headers(err.into_response(), &risk_headers);
    }

    let forward_payload = build_forward_payload(&parsed, body);

    match state.upstream.settle(&forward_payload).await {
        Ok(upstream) => {
            state.debug.set_settle(Snapshot::new(
                &upstream.url,
                upstream.status,
                upstream.body.clone(),
                request_id,
                forward_payload
                    .get("paymentRequirements")
                    .cloned()
                    .unwrap_or(Value::Null),
            ));
            let narrowed = narrow_settle_response(&upstream.body);
            let response = (StatusCode::OK, Json(narrowed)).into_response();
            with_extra_headers(response, &risk_headers)
        }
        Err(err) => with_extra_headers(upstream_error_response(err, request_id), &risk_headers),
    }
}

/// Governs risk evaluation by `settle_risk_enabled` (spec.md §4.5): when
/// disabled, no call is made to the evaluator at all and the response
/// carries `X-Risk-Decision: skipped`.
async fn gate(
    state: &SharedState,
    parsed: &ParsedRequest,
    request_id: &RequestId,
) -> Result<(Option<RiskDecision>, Vec<(HeaderName, String)>), GatewayError> {
    if !state.config.settle_risk_enabled {
        let headers = vec![(
            HeaderName::from_static("x-risk-decision"),
            "skipped".to_string(),
        )];
        return Ok((None, headers));
    }

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
    let decision = state
        .evaluator
        .evaluate(evaluate_request)
        .await
        .map_err(|e| e.into_gateway_error(request_id.clone()))?;

    let headers = vec![
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
    ];
    Ok((Some(decision), headers))
}

pub fn narrow_settle_response(body: &Value) -> SettleResponse {
    SettleResponse {
        success: body.get("success").and_then(Value::as_bool).unwrap_or(false),
        payer: body.get("payer").and_then(Value::as_str).map(str::to_string),
        transaction: body
            .get("transaction")
            .and_then(Value::as_str)
            .map(str::to_string),
        network: body
            .get("network")
            .and_then(Value::as_str)
            .map(str::to_string),
        error_reason: body
            .get("errorReason")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrows_upstream_settle_response() {
        let body = serde_json::json!({
            "success": true,
            "payer": "0xabc",
            "transaction": "0xdeadbeef",
            "network": "base-sepolia"
        });
        let narrowed = narrow_settle_response(&body);
        assert!(narrowed.success);
        assert_eq!(narrowed.transaction.as_deref(), Some("0xdeadbeef"));
        assert!(narrowed.error_reason.is_none());
    }
}
