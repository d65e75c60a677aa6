//! Shared application state threaded through every handler via axum's
//! `State` extractor (spec.md §9: "a single immutable record threaded
//! through handlers via explicit context... only the store and snapshot
//! slots are truly shared").

use std::sync::Arc;

use crate::config::Config;
use crate::proxy::debug::DebugSnapshots;
use crate::proxy::upstream::UpstreamFacilitatorClient;
use crate::risk::evaluator::RiskEvaluator;
use crate::risk::store::RiskStore;

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RiskStore>,
    pub evaluator: Arc<dyn RiskEvaluator>,
    pub upstream: Arc<UpstreamFacilitatorClient>,
    pub debug: Arc<DebugSnapshots>,
}

pub type SharedState = Arc<AppState>;
