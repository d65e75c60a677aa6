//! Facilitator proxy (C5): `/x402/verify`, `/x402/settle`, and the
//! debug-snapshot diagnostic endpoint (spec.md §4.5).

pub mod debug;
pub mod settle;
pub mod shared;
pub mod upstream;
pub mod verify;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::instrument;

use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/x402/verify", post(verify::post_verify))
        .route("/x402/settle", post(settle::post_settle))
        .route("/x402/debug", get(get_debug))
}

/// `GET /x402/debug` (spec.md §4.5 "Debug snapshot", §6): `404` unless
/// `debug_enabled` is set.
#[instrument(skip_all)]
async fn get_debug(State(state): State<SharedState>) -> impl IntoResponse {
    if !state.config.debug_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(state.debug.snapshot_json()).into_response()
}
