//! Trace collector (C6, spec.md §4.6): projects an agent-stream event
//! sequence into the canonical `events[]` list of an `AgentTrace`, client-side,
//! before the trace is POSTed to `/risk/trace`.
//!
//! The underlying event stream is a state machine keyed on `call_id`
//! (spec.md §9: "implement it as such with an explicit table rather than
//! mirroring any particular SDK's event hierarchy"). `RawStreamEvent` below
//! is this gateway's own normalized vocabulary, not a copy of any provider
//! SDK's event enum.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::risk::model::{AgentTraceDocument, KnownTraceEvent, TraceEvent};

/// A single normalized streaming event this collector understands. A real
/// integration adapts a provider SDK's events into this vocabulary before
/// calling `ingest_event`; that adaptation is out of scope here (spec.md §1
/// treats the buyer-side agent runtime as a remote collaborator).
#[derive(Debug, Clone, PartialEq)]
pub enum RawStreamEvent {
    FunctionCallAdded { call_id: String, name: String },
    FunctionCallArgumentDelta { call_id: String, delta: String },
    FunctionCallDone { call_id: String },
    ReasoningSummaryDelta { delta: String },
    ReasoningSummaryDone,
    ResponseCreated,
    ResponseCompleted,
}

struct PendingCall {
    name: String,
    arguments_buffer: String,
}

/// A finalized function call, ready to be dispatched to a matching tool.
#[derive(Debug, Clone)]
pub struct FinalizedCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

type BoxedToolFn = dyn Fn(Value) -> Pin<Box<dyn Future<Output = Value> + Send>> + Send + Sync;

/// A callable tool, wrapped so every invocation is recorded as a
/// `tool_call`/`tool_result` event pair (spec.md §4.6 `tool(fn)`).
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    func: Arc<BoxedToolFn>,
}

impl Tool {
    /// Wraps an async function. Sync functions can be wrapped by returning
    /// `std::future::ready(value)` from the closure body.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Tool {
            name: name.into(),
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }
}

pub struct ProcessStreamResult {
    pub tool_results: HashMap<String, Value>,
}

/// Accumulates `TraceEvent`s into an `AgentTraceDocument`, coalescing
/// provider-specific streaming deltas along the way. Cheap to clone the
/// `Arc` and share across the async tasks handling one agent turn.
#[derive(Default)]
pub struct TraceCollector {
    document: Mutex<AgentTraceDocument>,
    pending_calls: Mutex<HashMap<String, PendingCall>>,
    reasoning_buffer: Mutex<String>,
}

impl TraceCollector {
    pub fn new() -> Self {
        TraceCollector::default()
    }

    fn push_event(&self, event: KnownTraceEvent) {
        if let Ok(mut doc) = self.document.lock() {
            doc.events.push(TraceEvent::Known(event));
        }
    }

    pub fn record_user_input(&self, content: &str) {
        self.push_event(KnownTraceEvent::UserInput {
            ts_ns: now_ns(),
            content_hash: content_hash(content),
            len: content.len(),
        });
    }

    pub fn record_system_prompt(&self, content: &str, version: Option<String>) {
        self.push_event(KnownTraceEvent::SystemPrompt {
            ts_ns: now_ns(),
            content_hash: content_hash(content),
            len: content.len(),
            version,
        });
    }

    pub fn record_agent_output(&self, content: &str) {
        self.push_event(KnownTraceEvent::AgentOutput {
            ts_ns: now_ns(),
            content_hash: content_hash(content),
            len: content.len(),
        });
    }

    /// Populates `model_config` (spec.md §4.6 `set_model_config`).
    pub fn set_model_config(&self, provider: &str, model: &str, tools_enabled: &[String]) {
        if let Ok(mut doc) = self.document.lock() {
            doc.model_config = serde_json::json!({
                "provider": provider,
                "model": model,
                "tools_enabled": tools_enabled,
            });
        }
    }

    /// Coalesces one raw streaming event (spec.md §4.6 `ingest_event`).
    /// Returns the finalized call when a `function_call` completes so the
    /// caller (or `process_stream`) can dispatch it to a tool.
    pub fn ingest_event(&self, event: RawStreamEvent) -> Option<FinalizedCall> {
        match event {
            RawStreamEvent::FunctionCallAdded { call_id, name } => {
                if let Ok(mut pending) = self.pending_calls.lock() {
                    pending.insert(
                        call_id,
                        PendingCall {
                            name,
                            arguments_buffer: String::new(),
                        },
                    );
                }
                None
            }
            RawStreamEvent::FunctionCallArgumentDelta { call_id, delta } => {
                if let Ok(mut pending) = self.pending_calls.lock() {
                    if let Some(entry) = pending.get_mut(&call_id) {
                        entry.arguments_buffer.push_str(&delta);
                    }
                }
                None
            }
            RawStreamEvent::FunctionCallDone { call_id } => {
                let pending = self
                    .pending_calls
                    .lock()
                    .ok()
                    .and_then(|mut map| map.remove(&call_id))?;
                let arguments: Value = serde_json::from_str(&pending.arguments_buffer)
                    .unwrap_or_else(|_| serde_json::json!({ "_raw": pending.arguments_buffer }));
                self.push_event(KnownTraceEvent::FunctionCall {
                    ts_ns: now_ns(),
                    call_id: call_id.clone(),
                    name: pending.name.clone(),
                    arguments: arguments.clone(),
                });
                Some(FinalizedCall {
                    call_id,
                    name: pending.name,
                    arguments,
                })
            }
            RawStreamEvent::ReasoningSummaryDelta { delta } => {
                if let Ok(mut buffer) = self.reasoning_buffer.lock() {
                    buffer.push_str(&delta);
                }
                None
            }
            RawStreamEvent::ReasoningSummaryDone => {
                let content = self
                    .reasoning_buffer
                    .lock()
                    .map(|mut buffer| std::mem::take(&mut *buffer))
                    .unwrap_or_default();
                if !content.is_empty() {
                    self.push_event(KnownTraceEvent::ReasoningSummary {
                        ts_ns: now_ns(),
                        content,
                    });
                }
                None
            }
            RawStreamEvent::ResponseCreated => {
                self.push_event(KnownTraceEvent::ResponseCreated { ts_ns: now_ns() });
                None
            }
            RawStreamEvent::ResponseCompleted => {
                self.push_event(KnownTraceEvent::ResponseCompleted { ts_ns: now_ns() });
                None
            }
        }
    }

    /// Records a `tool_call`/`tool_result` event pair around one invocation
    /// of `tool` (spec.md §4.6 `tool(fn)`).
    pub async fn call_tool(&self, tool: &Tool, call_id: &str, arguments: Value) -> Value {
        self.push_event(KnownTraceEvent::ToolCall {
            ts_ns: now_ns(),
            call_id: call_id.to_string(),
            name: tool.name.clone(),
            arguments: arguments.clone(),
        });
        let result = (tool.func)(arguments).await;
        self.push_event(KnownTraceEvent::ToolResult {
            ts_ns: now_ns(),
            call_id: call_id.to_string(),
            result: result.clone(),
        });
        result
    }

    /// Consumes a raw event sequence to completion, dispatching any
    /// finalized function call to a matching tool by name (spec.md §4.6
    /// `process_stream`).
    pub async fn process_stream<I>(&self, stream: I, tools: &[Tool]) -> ProcessStreamResult
    where
        I: IntoIterator<Item = RawStreamEvent>,
    {
        let mut tool_results = HashMap::new();
        for event in stream {
            if let Some(finalized) = self.ingest_event(event) {
                if let Some(tool) = tools.iter().find(|t| t.name == finalized.name) {
                    let result = self
                        .call_tool(tool, &finalized.call_id, finalized.arguments)
                        .await;
                    tool_results.insert(finalized.name, result);
                }
            }
        }
        ProcessStreamResult { tool_results }
    }

    /// Finalizes the document: sets `task`/`completed_at` and returns the
    /// accumulated events for submission to `/risk/trace`.
    pub fn finish(&self, task: impl Into<String>) -> AgentTraceDocument {
        let mut doc = self
            .document
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        doc.task = Some(task.into());
        doc.completed_at = crate::timestamp::UnixTimestamp::try_now().ok();
        doc
    }
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn now_ns() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coalesces_function_call_argument_deltas() {
        let collector = TraceCollector::new();
        collector.ingest_event(RawStreamEvent::FunctionCallAdded {
            call_id: "call-1".to_string(),
            name: "lookup".to_string(),
        });
        collector.ingest_event(RawStreamEvent::FunctionCallArgumentDelta {
            call_id: "call-1".to_string(),
            delta: "{\"q".to_string(),
        });
        collector.ingest_event(RawStreamEvent::FunctionCallArgumentDelta {
            call_id: "call-1".to_string(),
            delta: "uery\":\"x\"}".to_string(),
        });
        let finalized = collector
            .ingest_event(RawStreamEvent::FunctionCallDone {
                call_id: "call-1".to_string(),
            })
            .unwrap();
        assert_eq!(finalized.name, "lookup");
        assert_eq!(finalized.arguments, serde_json::json!({"query": "x"}));
    }

    #[test]
    fn malformed_arguments_fall_back_to_raw() {
        let collector = TraceCollector::new();
        collector.ingest_event(RawStreamEvent::FunctionCallAdded {
            call_id: "call-1".to_string(),
            name: "lookup".to_string(),
        });
        collector.ingest_event(RawStreamEvent::FunctionCallArgumentDelta {
            call_id: "call-1".to_string(),
            delta: "not json".to_string(),
        });
        let finalized = collector
            .ingest_event(RawStreamEvent::FunctionCallDone {
                call_id: "call-1".to_string(),
            })
            .unwrap();
        assert_eq!(finalized.arguments, serde_json::json!({"_raw": "not json"}));
    }

    #[test]
    fn reasoning_deltas_collapse_into_one_event() {
        let collector = TraceCollector::new();
        collector.ingest_event(RawStreamEvent::ReasoningSummaryDelta {
            delta: "thinking".to_string(),
        });
        collector.ingest_event(RawStreamEvent::ReasoningSummaryDelta {
            delta: " more".to_string(),
        });
        collector.ingest_event(RawStreamEvent::ReasoningSummaryDone);
        let doc = collector.finish("task");
        let reasoning_events: Vec<_> = doc
            .events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Known(KnownTraceEvent::ReasoningSummary { .. })))
            .collect();
        assert_eq!(reasoning_events.len(), 1);
    }

    #[tokio::test]
    async fn process_stream_dispatches_finalized_call_to_matching_tool() {
        let collector = TraceCollector::new();
        let tool = Tool::new("lookup", |args| async move {
            serde_json::json!({"echo": args})
        });
        let stream = vec![
            RawStreamEvent::ResponseCreated,
            RawStreamEvent::FunctionCallAdded {
                call_id: "call-1".to_string(),
                name: "lookup".to_string(),
            },
            RawStreamEvent::FunctionCallArgumentDelta {
                call_id: "call-1".to_string(),
                delta: "{}".to_string(),
            },
            RawStreamEvent::FunctionCallDone {
                call_id: "call-1".to_string(),
            },
            RawStreamEvent::ResponseCompleted,
        ];
        let result = collector.process_stream(stream, &[tool]).await;
        assert!(result.tool_results.contains_key("lookup"));
        let doc = collector.finish("task");
        assert!(doc
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::Known(KnownTraceEvent::ToolCall { .. }))));
        assert!(doc
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::Known(KnownTraceEvent::ToolResult { .. }))));
    }

    #[test]
    fn record_user_input_hashes_content() {
        let collector = TraceCollector::new();
        collector.record_user_input("hello");
        let doc = collector.finish("task");
        match &doc.events[0] {
            TraceEvent::Known(KnownTraceEvent::UserInput { content_hash, len, .. }) => {
                assert_eq!(*len, 5);
                assert_eq!(content_hash.len(), 64);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
