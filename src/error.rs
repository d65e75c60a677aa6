//! Cross-cutting error taxonomy (spec.md §4.7, §7).
//!
//! Every error surfaced by the gateway renders as
//! `{error:{code,message}, request_id}`, following the
//! `PaymentProblem`/`AsPaymentProblem`/`ErrorReason` pattern
//! (`x402-types/src/proto/mod.rs`) and its `impl IntoResponse for
//! FacilitatorLocalError` in `handlers.rs`. The mapping from error code to
//! HTTP status is fixed and exhaustive; a request that fails multiple checks
//! reports the first failure in evaluation order (AP2 checks run
//! strictly in order, see `ap2::verify`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::request_id::RequestId;

/// The fixed error-code taxonomy from spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TraceHeaderInvalid,
    TraceHeaderUnsupported,
    EvidenceHeaderInvalid,
    EvidenceHeaderUnsupported,
    RiskSessionInvalid,
    RiskTraceInvalid,

    Ap2EvidenceMissing,
    Ap2EvidenceInvalid,
    Ap2OriginMismatch,
    Ap2ResourceMismatch,
    Ap2NetworkMismatch,
    Ap2PaytoMismatch,
    Ap2AssetMismatch,
    Ap2TtlNotBefore,
    Ap2TtlExpired,
    Ap2PaymentHashMismatch,
    Ap2MerchantDenied,
    Ap2SigUnavailable,
    Ap2SigInvalid,
    Ap2SigPayerMismatch,
    Ap2ChainUnsupported,
    Ap2AmountExceeded,

    RiskDenied,
    RiskReview,

    Unspecified,
}

impl ErrorCode {
    /// The HTTP status this code maps to, per spec.md §7's mapping table:
    /// header/parse failures → 400, AP2 failures → 422, risk deny → 403,
    /// upstream non-200 is handled separately (status is propagated verbatim).
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorCode::TraceHeaderInvalid
            | ErrorCode::TraceHeaderUnsupported
            | ErrorCode::EvidenceHeaderInvalid
            | ErrorCode::EvidenceHeaderUnsupported
            | ErrorCode::RiskSessionInvalid
            | ErrorCode::RiskTraceInvalid => StatusCode::BAD_REQUEST,

            ErrorCode::Ap2EvidenceMissing
            | ErrorCode::Ap2EvidenceInvalid
            | ErrorCode::Ap2OriginMismatch
            | ErrorCode::Ap2ResourceMismatch
            | ErrorCode::Ap2NetworkMismatch
            | ErrorCode::Ap2PaytoMismatch
            | ErrorCode::Ap2AssetMismatch
            | ErrorCode::Ap2TtlNotBefore
            | ErrorCode::Ap2TtlExpired
            | ErrorCode::Ap2PaymentHashMismatch
            | ErrorCode::Ap2MerchantDenied
            | ErrorCode::Ap2SigUnavailable
            | ErrorCode::Ap2SigInvalid
            | ErrorCode::Ap2SigPayerMismatch
            | ErrorCode::Ap2ChainUnsupported
            | ErrorCode::Ap2AmountExceeded => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::RiskDenied => StatusCode::FORBIDDEN,
            ErrorCode::RiskReview => StatusCode::FORBIDDEN,

            ErrorCode::Unspecified => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
    pub request_id: String,
}

/// A gateway-level error, always rendered with the request id that was
/// minted for the inbound request.
#[derive(Debug)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: RequestId,
    /// Overrides the status derived from `code`, used when propagating an
    /// upstream non-200 status verbatim (spec.md §4.5 step 8, §7).
    pub status_override: Option<StatusCode>,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>, request_id: RequestId) -> Self {
        GatewayError {
            code,
            message: message.into(),
            request_id,
            status_override: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_override.unwrap_or_else(|| self.code.status_code());
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
            request_id: self.request_id.0.clone(),
        };
        let mut response = (status, Json(envelope)).into_response();
        crate::request_id::apply_header(&mut response, &self.request_id);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_error_table() {
        assert_eq!(
            ErrorCode::TraceHeaderInvalid.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::Ap2OriginMismatch.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorCode::RiskDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::Unspecified.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn serializes_codes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::Ap2OriginMismatch).unwrap();
        assert_eq!(json, "\"AP2_ORIGIN_MISMATCH\"");
    }
}
