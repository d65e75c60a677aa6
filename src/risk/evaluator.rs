//! `RiskEvaluator`: the seam between the risk router and either the local
//! always-allow evaluator (spec.md §4.2) or the forwarding adapter (§4.3).

use async_trait::async_trait;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::{ErrorCode, GatewayError};
use crate::request_id::RequestId;

use super::model::{Decision, EvaluateRequest, RiskDecision, RiskLevel};
use super::store::{RiskStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("risk engine returned status {status}: {body}")]
    UpstreamStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("risk engine response was not valid JSON")]
    UpstreamMalformedJson,
    #[error("risk engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl EvaluateError {
    /// Maps a risk-evaluation failure to a `GatewayError`, shared by the
    /// `/risk/evaluate` endpoint and the facilitator proxy's gating step
    /// (spec.md §4.2, §4.5 step 4) so the two call sites can't drift.
    pub fn into_gateway_error(self, request_id: RequestId) -> GatewayError {
        match self {
            EvaluateError::Store(StoreError::UnknownSid) => {
                GatewayError::new(ErrorCode::RiskSessionInvalid, "unknown sid", request_id)
            }
            EvaluateError::Store(other) => {
                GatewayError::new(ErrorCode::RiskTraceInvalid, other.to_string(), request_id)
            }
            EvaluateError::UpstreamStatus { status, body } => {
                GatewayError::new(ErrorCode::Unspecified, body, request_id).with_status(status)
            }
            EvaluateError::UpstreamMalformedJson => GatewayError::new(
                ErrorCode::Unspecified,
                "risk engine returned a non-JSON response",
                request_id,
            )
            .with_status(StatusCode::BAD_GATEWAY),
            EvaluateError::Transport(e) => GatewayError::new(
                ErrorCode::Unspecified,
                format!("risk engine request failed: {e}"),
                request_id,
            )
            .with_status(StatusCode::BAD_GATEWAY),
        }
    }
}

#[async_trait]
pub trait RiskEvaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluateRequest) -> Result<RiskDecision, EvaluateError>;
}

/// The in-process local evaluator (spec.md §4.2): validates `(sid, tid)`
/// against the store, then always returns `allow` — this is the dev/test
/// contract; a real policy lives behind `ForwardingRiskEvaluator`.
pub struct LocalRiskEvaluator {
    store: std::sync::Arc<RiskStore>,
    default_ttl_seconds: u64,
}

impl LocalRiskEvaluator {
    pub fn new(store: std::sync::Arc<RiskStore>, default_ttl_seconds: u64) -> Self {
        LocalRiskEvaluator {
            store,
            default_ttl_seconds,
        }
    }
}

#[async_trait]
impl RiskEvaluator for LocalRiskEvaluator {
    async fn evaluate(&self, request: EvaluateRequest) -> Result<RiskDecision, EvaluateError> {
        self.store
            .validate_session_and_trace(request.sid, request.tid)?;
        Ok(RiskDecision {
            decision: Decision::Allow,
            reasons: Vec::new(),
            decision_id: Uuid::now_v7(),
            ttl_seconds: self.default_ttl_seconds,
            used_mandate: request.mandate.is_some(),
            warnings: Vec::new(),
            risk_level: RiskLevel::Low,
            extra: serde_json::Value::Null,
        })
    }
}
