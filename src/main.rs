//! Agent-payment gateway HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server exposing three
//! subsystems behind one process: the risk-session/trace store (`/risk/*`),
//! the AP2-gated x402 facilitator proxy (`/x402/*`), and a liveness probe
//! (`/health`).
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `OTEL_*` variables enable tracing export to systems like Honeycomb
//! - see `config::Config` for the full key/value table

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use x402_risk_gateway::config::Config;
use x402_risk_gateway::health;
use x402_risk_gateway::proxy;
use x402_risk_gateway::proxy::debug::DebugSnapshots;
use x402_risk_gateway::proxy::upstream::UpstreamFacilitatorClient;
use x402_risk_gateway::request_id::RequestIdLayer;
use x402_risk_gateway::risk;
use x402_risk_gateway::risk::evaluator::{LocalRiskEvaluator, RiskEvaluator};
use x402_risk_gateway::risk::forwarding::ForwardingRiskEngineClient;
use x402_risk_gateway::risk::store::{spawn_ttl_sweep, RiskStore};
use x402_risk_gateway::state::{AppState, SharedState};
use x402_risk_gateway::util::{SigDown, Telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let telemetry = Telemetry::new();

    let config = Arc::new(Config::load());

    let store = Arc::new(RiskStore::new(config.local_ttl(), config.local_store_capacity));
    spawn_ttl_sweep(store.clone(), Duration::from_secs(60));

    let evaluator: Arc<dyn RiskEvaluator> = if config.proxy_local_risk || config.risk_engine_url.is_none() {
        Arc::new(LocalRiskEvaluator::new(store.clone(), config.local_ttl_seconds))
    } else {
        let base_url = config
            .risk_engine_url
            .clone()
            .expect("checked non-None above");
        Arc::new(ForwardingRiskEngineClient::new(
            base_url,
            Some(config.risk_internal_token.clone()),
            config.risk_engine_compat,
            config.request_timeout(),
        ))
    };

    let upstream = Arc::new(UpstreamFacilitatorClient::new(
        config.facilitator_verify_url.clone(),
        config.facilitator_settle_url.clone(),
        config.request_timeout(),
    ));

    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        store,
        evaluator,
        upstream,
        debug: Arc::new(DebugSnapshots::default()),
    });

    let http_endpoints = Router::new()
        .merge(risk::router::routes())
        .merge(proxy::routes())
        .route("/health", get(health::get_health))
        .with_state(state)
        .layer(RequestIdLayer)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("Starting agent-payment gateway at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
        std::process::exit(1);
    });

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };

    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
