//! In-memory, TTL-scoped session/trace store (spec.md §4.2, §5).
//!
//! Two `DashMap`s provide O(1) insert/lookup under concurrent access, the
//! same choice of `dashmap` used elsewhere in this codebase for caches.
//! Eviction is both lazy (on read, expired entries are treated as absent and removed) and
//! periodic (a background sweep, started by the caller via `spawn_ttl_sweep`) —
//! correctness does not depend on either running.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp::UnixTimestamp;

use super::model::{AgentTrace, AgentTraceDocument, RiskSession};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown sid")]
    UnknownSid,
    #[error("unknown tid")]
    UnknownTid,
    #[error("tid not linked to sid")]
    TidNotLinkedToSid,
}

pub struct RiskStore {
    sessions: DashMap<Uuid, RiskSession>,
    traces: DashMap<Uuid, AgentTrace>,
    ttl: Duration,
    capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub agent_did: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub agent_endpoint: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub device: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub sid: Uuid,
    pub expires_at: UnixTimestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTraceRequest {
    pub sid: Uuid,
    #[serde(default)]
    pub fingerprint: Option<serde_json::Value>,
    #[serde(default)]
    pub telemetry: Option<serde_json::Value>,
    #[serde(default)]
    pub agent_trace: Option<AgentTraceDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTraceResponse {
    pub tid: Uuid,
}

impl RiskStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        RiskStore {
            sessions: DashMap::new(),
            traces: DashMap::new(),
            ttl,
            capacity,
        }
    }

    pub fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, std::time::SystemTimeError> {
        let expires_at = UnixTimestamp::try_now()? + self.ttl.as_secs();
        let sid = Uuid::now_v7();
        evict_at_capacity(&self.sessions, self.capacity);
        self.sessions.insert(
            sid,
            RiskSession {
                sid,
                agent_did: request.agent_did,
                wallet_address: request.wallet_address,
                agent_endpoint: request.agent_endpoint,
                app_id: request.app_id,
                device: request.device,
                expires_at,
            },
        );
        Ok(CreateSessionResponse { sid, expires_at })
    }

    pub fn create_trace(
        &self,
        request: CreateTraceRequest,
    ) -> Result<CreateTraceResponse, StoreError> {
        if self.lookup_session(request.sid).is_none() {
            return Err(StoreError::UnknownSid);
        }
        let expires_at =
            UnixTimestamp::try_now().map_err(|_| StoreError::UnknownSid)? + self.ttl.as_secs();
        let tid = Uuid::now_v7();
        evict_at_capacity(&self.traces, self.capacity);
        self.traces.insert(
            tid,
            AgentTrace {
                tid,
                sid: request.sid,
                fingerprint: request.fingerprint,
                telemetry: request.telemetry,
                agent_trace: request.agent_trace,
                expires_at,
            },
        );
        Ok(CreateTraceResponse { tid })
    }

    /// Validates `(sid, tid?)` per spec.md §4.2's Evaluate contract: unknown
    /// sid, unknown tid, or tid-not-linked-to-sid are distinct failures.
    pub fn validate_session_and_trace(
        &self,
        sid: Uuid,
        tid: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.lookup_session(sid).ok_or(StoreError::UnknownSid)?;
        if let Some(tid) = tid {
            let trace = self.lookup_trace(tid).ok_or(StoreError::UnknownTid)?;
            if trace.sid != sid {
                return Err(StoreError::TidNotLinkedToSid);
            }
        }
        Ok(())
    }

    pub fn lookup_session(&self, sid: Uuid) -> Option<RiskSession> {
        let now = UnixTimestamp::try_now().ok()?;
        let entry = self.sessions.get(&sid)?;
        if entry.is_valid_at(now) {
            Some(entry.clone())
        } else {
            drop(entry);
            self.sessions.remove(&sid);
            None
        }
    }

    pub fn lookup_trace(&self, tid: Uuid) -> Option<AgentTrace> {
        let now = UnixTimestamp::try_now().ok()?;
        let entry = self.traces.get(&tid)?;
        if entry.expires_at.seconds_since_epoch() > now.seconds_since_epoch() {
            Some(entry.clone())
        } else {
            drop(entry);
            self.traces.remove(&tid);
            None
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    fn sweep_once(&self) {
        let Ok(now) = UnixTimestamp::try_now() else {
            return;
        };
        self.sessions
            .retain(|_, session| session.is_valid_at(now));
        self.traces
            .retain(|_, trace| trace.expires_at.seconds_since_epoch() > now.seconds_since_epoch());
    }
}

/// At capacity, evicts the entry with the soonest expiry to make room for an
/// insert. Bounds worst-case memory growth under sustained load on top of
/// the lazy/periodic TTL eviction above.
fn evict_at_capacity<K, V>(map: &DashMap<K, V>, capacity: usize)
where
    K: std::hash::Hash + Eq + Clone,
    V: ExpiresAt,
{
    if map.len() < capacity {
        return;
    }
    let oldest = map
        .iter()
        .min_by_key(|entry| entry.value().expires_at_secs())
        .map(|entry| entry.key().clone());
    if let Some(key) = oldest {
        map.remove(&key);
    }
}

trait ExpiresAt {
    fn expires_at_secs(&self) -> u64;
}

impl ExpiresAt for RiskSession {
    fn expires_at_secs(&self) -> u64 {
        self.expires_at.seconds_since_epoch()
    }
}

impl ExpiresAt for AgentTrace {
    fn expires_at_secs(&self) -> u64 {
        self.expires_at.seconds_since_epoch()
    }
}

/// Starts the periodic TTL sweep as a background task (SPEC_FULL.md's
/// "Supplemented features"). Correctness never depends on this running; it
/// only bounds how long expired entries can linger between reads.
pub fn spawn_ttl_sweep(store: Arc<RiskStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            store.sweep_once();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RiskStore {
        RiskStore::new(Duration::from_secs(900), 10_000)
    }

    #[test]
    fn create_session_then_create_trace_links_them() {
        let store = store();
        let session = store
            .create_session(CreateSessionRequest {
                agent_did: "0xabc".to_string(),
                wallet_address: None,
                agent_endpoint: None,
                app_id: None,
                device: None,
            })
            .unwrap();
        let trace = store
            .create_trace(CreateTraceRequest {
                sid: session.sid,
                fingerprint: None,
                telemetry: None,
                agent_trace: None,
            })
            .unwrap();
        assert!(store
            .validate_session_and_trace(session.sid, Some(trace.tid))
            .is_ok());
    }

    #[test]
    fn create_trace_rejects_unknown_sid() {
        let store = store();
        let err = store
            .create_trace(CreateTraceRequest {
                sid: Uuid::now_v7(),
                fingerprint: None,
                telemetry: None,
                agent_trace: None,
            })
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownSid);
    }

    #[test]
    fn validate_rejects_tid_linked_to_different_session() {
        let store = store();
        let session_a = store
            .create_session(CreateSessionRequest {
                agent_did: "0xa".to_string(),
                wallet_address: None,
                agent_endpoint: None,
                app_id: None,
                device: None,
            })
            .unwrap();
        let session_b = store
            .create_session(CreateSessionRequest {
                agent_did: "0xb".to_string(),
                wallet_address: None,
                agent_endpoint: None,
                app_id: None,
                device: None,
            })
            .unwrap();
        let trace = store
            .create_trace(CreateTraceRequest {
                sid: session_a.sid,
                fingerprint: None,
                telemetry: None,
                agent_trace: None,
            })
            .unwrap();
        let err = store
            .validate_session_and_trace(session_b.sid, Some(trace.tid))
            .unwrap_err();
        assert_eq!(err, StoreError::TidNotLinkedToSid);
    }

    #[test]
    fn expired_session_is_lazily_evicted_on_lookup() {
        let store = RiskStore::new(Duration::from_secs(0), 10_000);
        let session = store
            .create_session(CreateSessionRequest {
                agent_did: "0xabc".to_string(),
                wallet_address: None,
                agent_endpoint: None,
                app_id: None,
                device: None,
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        assert!(store.lookup_session(session.sid).is_none());
        assert_eq!(store.session_count(), 0);
    }
}
