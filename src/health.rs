//! `GET /health` (spec.md §6): liveness, reporting the configured upstream
//! URLs and the current timestamp. Follows the `get_health`/`get_root`
//! handlers (`handlers.rs`), which serve discovery metadata rather than a
//! bare 200.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::instrument;

use crate::state::SharedState;
use crate::timestamp::UnixTimestamp;

#[instrument(skip_all)]
pub async fn get_health(State(state): State<SharedState>) -> impl IntoResponse {
    let now = UnixTimestamp::try_now().ok();
    Json(json!({
        "status": "ok",
        "now": now,
        "facilitator_verify_url": state.config.facilitator_verify_url.to_string(),
        "facilitator_settle_url": state.config.facilitator_settle_url.to_string(),
        "risk_engine_url": state.config.risk_engine_url.as_ref().map(|u| u.to_string()),
        "proxy_local_risk": state.config.proxy_local_risk,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::proxy::debug::DebugSnapshots;
    use crate::proxy::upstream::UpstreamFacilitatorClient;
    use crate::risk::evaluator::LocalRiskEvaluator;
    use crate::risk::store::RiskStore;
    use crate::state::AppState;
    use clap::Parser;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn reports_configured_urls() {
        let config = Arc::new(Config::parse_from(["x402-risk-gateway"]));
        let store = Arc::new(RiskStore::new(Duration::from_secs(900), 10_000));
        let evaluator = Arc::new(LocalRiskEvaluator::new(store.clone(), 300));
        let upstream = Arc::new(UpstreamFacilitatorClient::new(
            config.facilitator_verify_url.clone(),
            config.facilitator_settle_url.clone(),
            Duration::from_secs(15),
        ));
        let state: SharedState = Arc::new(AppState {
            config,
            store,
            evaluator,
            upstream,
            debug: Arc::new(DebugSnapshots::default()),
        });
        let response = get_health(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
