//! Forwarding dispatch to an external risk engine (spec.md §4.3), including
//! the legacy-dialect compatibility adapter.
//!
//! Follows the same shape as `FacilitatorClient` (`facilitator_client.rs`):
//! a cheap-to-clone `reqwest::Client`, a `post_json` helper that maps
//! transport/status/decode failures into a typed error, and an optional
//! bearer header attached to every outbound call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use url::Url;

use super::evaluator::{EvaluateError, RiskEvaluator};
use super::model::{EvaluateRequest, RiskDecision};
use super::store::{CreateSessionRequest, CreateSessionResponse, CreateTraceRequest, CreateTraceResponse};

/// Fields the (hypothetical) legacy risk-engine dialect recognizes on a
/// session-creation payload; anything else is stripped before send.
const COMPAT_SESSION_FIELDS: &[&str] = &["agent_id", "wallet_address", "app_id", "device"];

pub struct ForwardingRiskEngineClient {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
    compat: bool,
}

impl ForwardingRiskEngineClient {
    pub fn new(base_url: Url, bearer_token: Option<String>, compat: bool, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        ForwardingRiskEngineClient {
            client,
            base_url,
            bearer_token,
            compat,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = self
            .base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone());
        let mut builder = self.client.post(url);
        if let Some(token) = &self.bearer_token {
            if !token.is_empty() {
                builder = builder.bearer_auth(token);
            }
        }
        builder
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, EvaluateError> {
        let response = self.request(path).json(&body).send().await?;
        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EvaluateError::UpstreamStatus { status, body });
        }
        response
            .json::<Value>()
            .await
            .map_err(|_| EvaluateError::UpstreamMalformedJson)
    }

    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse, EvaluateError> {
        let body = if self.compat {
            adapt_session_request_for_compat(request)
        } else {
            serde_json::to_value(request).unwrap_or(Value::Null)
        };
        let value = self.post_json("session", body).await?;
        serde_json::from_value(value).map_err(|_| EvaluateError::UpstreamMalformedJson)
    }

    pub async fn create_trace(
        &self,
        request: &CreateTraceRequest,
    ) -> Result<CreateTraceResponse, EvaluateError> {
        let body = if self.compat {
            adapt_trace_request_for_compat(request)
        } else {
            serde_json::to_value(request).unwrap_or(Value::Null)
        };
        let mut value = self.post_json("trace", body).await?;
        if self.compat {
            alias_trace_id_to_tid(&mut value);
        }
        serde_json::from_value(value).map_err(|_| EvaluateError::UpstreamMalformedJson)
    }
}

#[async_trait]
impl RiskEvaluator for ForwardingRiskEngineClient {
    async fn evaluate(&self, request: EvaluateRequest) -> Result<RiskDecision, EvaluateError> {
        let body = serde_json::to_value(&request).unwrap_or(Value::Null);
        let mut value = self.post_json("evaluate", body).await?;
        if self.compat {
            alias_trace_id_to_tid(&mut value);
        }
        serde_json::from_value(value).map_err(|_| EvaluateError::UpstreamMalformedJson)
    }
}

/// Adapts a `CreateSessionRequest` for the legacy dialect: rename
/// `agent_did`→`agent_id` (falling back to `wallet_address` if that's absent
/// too), inject a default `device` when none was supplied, strip any field
/// the legacy schema doesn't recognize.
fn adapt_session_request_for_compat(request: &CreateSessionRequest) -> Value {
    let mut out = Map::new();
    let agent_id = if !request.agent_did.is_empty() {
        request.agent_did.clone()
    } else {
        request.wallet_address.clone().unwrap_or_default()
    };
    out.insert("agent_id".to_string(), json!(agent_id));
    if let Some(wallet) = &request.wallet_address {
        out.insert("wallet_address".to_string(), json!(wallet));
    }
    if let Some(app_id) = &request.app_id {
        out.insert("app_id".to_string(), json!(app_id));
    }
    out.insert(
        "device".to_string(),
        request.device.clone().unwrap_or_else(|| json!({})),
    );
    out.retain(|key, _| COMPAT_SESSION_FIELDS.contains(&key.as_str()));
    Value::Object(out)
}

/// Adapts a `CreateTraceRequest` for the legacy dialect: `fingerprint` and
/// `telemetry` maps are serialized to JSON strings rather than sent as
/// nested objects.
fn adapt_trace_request_for_compat(request: &CreateTraceRequest) -> Value {
    let mut out = Map::new();
    out.insert("sid".to_string(), json!(request.sid));
    if let Some(fingerprint) = &request.fingerprint {
        out.insert(
            "fingerprint".to_string(),
            json!(fingerprint.to_string()),
        );
    }
    if let Some(telemetry) = &request.telemetry {
        out.insert("telemetry".to_string(), json!(telemetry.to_string()));
    }
    if let Some(agent_trace) = &request.agent_trace {
        out.insert(
            "agent_trace".to_string(),
            serde_json::to_value(agent_trace).unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

/// On the response path, the legacy dialect names the trace identifier
/// `trace_id`; this gateway's contract always calls it `tid`.
fn alias_trace_id_to_tid(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };
    if !map.contains_key("tid") {
        if let Some(trace_id) = map.remove("trace_id") {
            map.insert("tid".to_string(), trace_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compat_adapter_renames_agent_did_to_agent_id() {
        let request = CreateSessionRequest {
            agent_did: "0xabc".to_string(),
            wallet_address: Some("0xdef".to_string()),
            agent_endpoint: None,
            app_id: None,
            device: None,
        };
        let adapted = adapt_session_request_for_compat(&request);
        assert_eq!(adapted.get("agent_id"), Some(&json!("0xabc")));
        assert!(adapted.get("agent_did").is_none());
        assert!(adapted.get("device").is_some());
    }

    #[test]
    fn compat_adapter_falls_back_to_wallet_address() {
        let request = CreateSessionRequest {
            agent_did: "".to_string(),
            wallet_address: Some("0xdef".to_string()),
            agent_endpoint: None,
            app_id: None,
            device: None,
        };
        let adapted = adapt_session_request_for_compat(&request);
        assert_eq!(adapted.get("agent_id"), Some(&json!("0xdef")));
    }

    #[test]
    fn alias_trace_id_to_tid_only_when_tid_absent() {
        let mut value = json!({"trace_id": "abc-123"});
        alias_trace_id_to_tid(&mut value);
        assert_eq!(value.get("tid"), Some(&json!("abc-123")));
        assert!(value.get("trace_id").is_none());
    }

    #[test]
    fn fingerprint_and_telemetry_are_stringified_under_compat() {
        let request = CreateTraceRequest {
            sid: uuid::Uuid::now_v7(),
            fingerprint: Some(json!({"ua": "test"})),
            telemetry: Some(json!({"lat_ms": 12})),
            agent_trace: None,
        };
        let adapted = adapt_trace_request_for_compat(&request);
        assert!(adapted.get("fingerprint").unwrap().is_string());
        assert!(adapted.get("telemetry").unwrap().is_string());
    }
}
