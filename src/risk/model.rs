//! Risk-store entities (spec.md §3): `RiskSession`, `AgentTrace`, and the
//! request/response shapes of `/risk/evaluate`.
//!
//! Agent-trace documents are schemaless JSON (spec.md §9): events are stored
//! as tagged variants per known event type plus a catch-all raw value, never
//! as one rigid struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::timestamp::UnixTimestamp;
use crate::trace_context::TraceContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSession {
    pub sid: Uuid,
    pub agent_did: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub agent_endpoint: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub device: Option<Value>,
    pub expires_at: UnixTimestamp,
}

impl RiskSession {
    pub fn is_valid_at(&self, now: UnixTimestamp) -> bool {
        now.seconds_since_epoch() < self.expires_at.seconds_since_epoch()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrace {
    pub tid: Uuid,
    pub sid: Uuid,
    #[serde(default)]
    pub fingerprint: Option<Value>,
    #[serde(default)]
    pub telemetry: Option<Value>,
    #[serde(default)]
    pub agent_trace: Option<AgentTraceDocument>,
    pub expires_at: UnixTimestamp,
}

/// The free-form document an agent-trace event stream is projected into
/// (`trace_collector`), or submitted directly to `/risk/trace`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTraceDocument {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub environment: Value,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
    #[serde(default)]
    pub model_config: Value,
    #[serde(default)]
    pub session_context: Value,
    #[serde(default)]
    pub completed_at: Option<UnixTimestamp>,
}

/// A single trace event. `Known` carries one of the typed variants below;
/// anything the collector or a caller submits that doesn't match a known
/// shape is kept as `Raw` rather than rejected. Serde has no way to mix an
/// internally-tagged representation with a per-variant untagged fallback in
/// one enum, so the fallback lives one level up: `Known` is tried first and
/// `Raw` only matches what it rejects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceEvent {
    Known(KnownTraceEvent),
    Raw(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownTraceEvent {
    UserInput {
        ts_ns: u128,
        content_hash: String,
        len: usize,
    },
    SystemPrompt {
        ts_ns: u128,
        content_hash: String,
        len: usize,
        version: Option<String>,
    },
    AgentOutput {
        ts_ns: u128,
        content_hash: String,
        len: usize,
    },
    ToolCall {
        ts_ns: u128,
        call_id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        ts_ns: u128,
        call_id: String,
        result: Value,
    },
    FunctionCall {
        ts_ns: u128,
        call_id: String,
        name: String,
        arguments: Value,
    },
    ReasoningSummary {
        ts_ns: u128,
        content: String,
    },
    ResponseCreated {
        ts_ns: u128,
    },
    ResponseCompleted {
        ts_ns: u128,
    },
}

impl TraceEvent {
    pub fn as_known(&self) -> Option<&KnownTraceEvent> {
        match self {
            TraceEvent::Known(event) => Some(event),
            TraceEvent::Raw(_) => None,
        }
    }
}

impl From<KnownTraceEvent> for TraceEvent {
    fn from(event: KnownTraceEvent) -> Self {
        TraceEvent::Known(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub decision: Decision,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub decision_id: Uuid,
    pub ttl_seconds: u64,
    pub used_mandate: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub extra: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub sid: Uuid,
    #[serde(default)]
    pub tid: Option<Uuid>,
    #[serde(default)]
    pub trace_context: Option<EvaluateTraceContext>,
    pub payment: crate::payment::PaymentContext,
    #[serde(default)]
    pub mandate: Option<Value>,
}

/// The wire shape of `trace_context` inside `EvaluateRequest`: just the raw
/// `tp`/`ts` strings, parsed by the handler rather than the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateTraceContext {
    pub tp: String,
    #[serde(default)]
    pub ts: Option<String>,
}

impl EvaluateTraceContext {
    pub fn parse(&self) -> Result<TraceContext, crate::trace_context::TraceContextError> {
        Ok(TraceContext {
            traceparent: crate::trace_context::Traceparent::parse(&self.tp)?,
            tracestate: self.ts.clone(),
        })
    }
}
