//! Public HTTP endpoints under `/risk` (spec.md §4.3, §6).

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use regex::Regex;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ErrorCode, GatewayError};
use crate::request_id::RequestId;
use crate::state::SharedState;

use super::model::EvaluateRequest;
use super::store::{CreateSessionRequest, CreateTraceRequest, StoreError};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/risk/session", post(post_session))
        .route("/risk/trace", post(post_trace))
        .route("/risk/evaluate", post(post_evaluate))
        .route("/risk/trace/{tid}", get(get_trace))
}

fn wallet_address_regex() -> Regex {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex is valid")
}

#[instrument(skip_all)]
pub async fn post_session(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    if let Some(wallet) = &body.wallet_address {
        if !wallet_address_regex().is_match(wallet) {
            return GatewayError::new(
                ErrorCode::RiskSessionInvalid,
                "wallet_address must match ^0x[0-9a-fA-F]{40}$",
                request_id,
            )
            .into_response();
        }
    }

    if state.config.proxy_local_risk || state.config.risk_engine_url.is_none() {
        match state.store.create_session(body) {
            Ok(response) => Json(response).into_response(),
            Err(_) => GatewayError::new(
                ErrorCode::Unspecified,
                "failed to compute session expiry",
                request_id,
            )
            .into_response(),
        }
    } else {
        forward_session(&state, &body, request_id).await
    }
}

async fn forward_session(
    state: &SharedState,
    body: &CreateSessionRequest,
    request_id: RequestId,
) -> axum::response::Response {
    let Some(base_url) = state.config.risk_engine_url.clone() else {
        return GatewayError::new(ErrorCode::Unspecified, "no risk engine configured", request_id)
            .into_response();
    };
    let client = crate::risk::forwarding::ForwardingRiskEngineClient::new(
        base_url,
        Some(state.config.risk_internal_token.clone()),
        state.config.risk_engine_compat,
        state.config.request_timeout(),
    );
    match client.create_session(body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => upstream_error_response(e, request_id),
    }
}

#[instrument(skip_all)]
pub async fn post_trace(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<CreateTraceRequest>,
) -> impl IntoResponse {
    if state.config.proxy_local_risk || state.config.risk_engine_url.is_none() {
        match state.store.create_trace(body) {
            Ok(response) => Json(response).into_response(),
            Err(StoreError::UnknownSid) => {
                GatewayError::new(ErrorCode::RiskSessionInvalid, "unknown sid", request_id)
                    .into_response()
            }
            Err(other) => {
                GatewayError::new(ErrorCode::RiskTraceInvalid, other.to_string(), request_id)
                    .into_response()
            }
        }
    } else {
        let Some(base_url) = state.config.risk_engine_url.clone() else {
            return GatewayError::new(ErrorCode::Unspecified, "no risk engine configured", request_id)
                .into_response();
        };
        let client = crate::risk::forwarding::ForwardingRiskEngineClient::new(
            base_url,
            Some(state.config.risk_internal_token.clone()),
            state.config.risk_engine_compat,
            state.config.request_timeout(),
        );
        match client.create_trace(&body).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => upstream_error_response(e, request_id),
        }
    }
}

#[instrument(skip_all)]
pub async fn post_evaluate(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<EvaluateRequest>,
) -> impl IntoResponse {
    match state.evaluator.evaluate(body).await {
        Ok(decision) => Json(decision).into_response(),
        Err(crate::risk::evaluator::EvaluateError::Store(StoreError::UnknownSid)) => {
            GatewayError::new(ErrorCode::RiskSessionInvalid, "unknown sid", request_id)
                .into_response()
        }
        Err(crate::risk::evaluator::EvaluateError::Store(other)) => {
            GatewayError::new(ErrorCode::RiskTraceInvalid, other.to_string(), request_id)
                .into_response()
        }
        Err(e) => upstream_error_response(e, request_id),
    }
}

/// Diagnostics only, enabled only in local mode (spec.md §4.3, §6): `501`
/// otherwise.
#[instrument(skip_all)]
pub async fn get_trace(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(tid): Path<Uuid>,
) -> impl IntoResponse {
    if !state.config.proxy_local_risk {
        return (
            axum::http::StatusCode::NOT_IMPLEMENTED,
            Json(json!({"error": "diagnostics only available in local mode"})),
        )
            .into_response();
    }
    match state.store.lookup_trace(tid) {
        Some(trace) => Json(trace).into_response(),
        None => GatewayError::new(ErrorCode::RiskTraceInvalid, "unknown tid", request_id)
            .into_response(),
    }
}

fn upstream_error_response(
    error: crate::risk::evaluator::EvaluateError,
    request_id: RequestId,
) -> axum::response::Response {
    error.into_gateway_error(request_id).into_response()
}
