//! The rolling debug snapshot (spec.md §4.5 "Debug snapshot", §5 "Shared
//! resources"): a single-writer-wins last-value cell per endpoint. Readers
//! may observe a slightly stale or in-flight-replaced value; that's
//! acceptable because this is diagnostic-only state.

use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value;

use crate::request_id::RequestId;

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub url: String,
    pub status: u16,
    pub body: Value,
    pub decoded: Value,
    pub request_id: String,
    pub sent_payment_requirements: Value,
}

#[derive(Default)]
pub struct DebugSnapshots {
    verify: RwLock<Option<Snapshot>>,
    settle: RwLock<Option<Snapshot>>,
}

impl DebugSnapshots {
    pub fn set_verify(&self, snapshot: Snapshot) {
        if let Ok(mut guard) = self.verify.write() {
            *guard = Some(snapshot);
        }
    }

    pub fn set_settle(&self, snapshot: Snapshot) {
        if let Ok(mut guard) = self.settle.write() {
            *guard = Some(snapshot);
        }
    }

    pub fn snapshot_json(&self) -> Value {
        let verify = self.verify.read().ok().and_then(|g| g.clone());
        let settle = self.settle.read().ok().and_then(|g| g.clone());
        serde_json::json!({ "verify": verify, "settle": settle })
    }
}

impl Snapshot {
    pub fn new(
        url: &url::Url,
        status: reqwest::StatusCode,
        body: Value,
        request_id: &RequestId,
        sent_payment_requirements: Value,
    ) -> Self {
        Snapshot {
            url: url.to_string(),
            status: status.as_u16(),
            body: body.clone(),
            decoded: body,
            request_id: request_id.0.clone(),
            sent_payment_requirements,
        }
    }
}
