//! Configuration for the agent-payment gateway.
//!
//! Values are resolved at startup from CLI flags / environment variables via
//! `clap`'s `env` attribute, following the same `Parser`-derived shape as
//! the facilitator config it is adapted from, but flattened: this gateway
//! has no chain or scheme configuration, only the key/value table in
//! spec.md §6.
//!
//! Configuration is read once at startup and threaded through handlers as a
//! `Arc<Config>` in `AppState`; nothing here is mutated after `Config::load`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use url::Url;

/// CLI/environment configuration for the gateway process.
#[derive(Parser, Debug, Clone)]
#[command(name = "x402-risk-gateway")]
#[command(about = "Agent-payment gateway: risk sessions, AP2 verification, and x402 proxying")]
pub struct Config {
    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value_t = config_defaults::DEFAULT_PORT)]
    pub port: u16,

    /// Host/interface to bind the HTTP server to.
    #[arg(long, env = "HOST", default_value = config_defaults::DEFAULT_HOST)]
    pub host: IpAddr,

    /// Upstream facilitator `/verify` URL.
    #[arg(
        long,
        env = "FACILITATOR_VERIFY_URL",
        default_value = "http://localhost:8083/verify"
    )]
    pub facilitator_verify_url: Url,

    /// Upstream facilitator `/settle` URL.
    #[arg(
        long,
        env = "FACILITATOR_SETTLE_URL",
        default_value = "http://localhost:8083/settle"
    )]
    pub facilitator_settle_url: Url,

    /// Per-call timeout (seconds) applied to every outbound HTTP call
    /// (evaluator and facilitator).
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value_t = 15)]
    pub request_timeout_seconds: u64,

    /// Whether `GET /x402/debug` is served (404 otherwise).
    #[arg(long, env = "DEBUG_ENABLED", default_value_t = true)]
    pub debug_enabled: bool,

    /// Whether `/x402/settle` gates on a risk decision at all.
    #[arg(long, env = "SETTLE_RISK_ENABLED", default_value_t = false)]
    pub settle_risk_enabled: bool,

    /// Use the in-process risk store/evaluator instead of forwarding to an
    /// external risk engine.
    #[arg(long, env = "PROXY_LOCAL_RISK", default_value_t = false)]
    pub proxy_local_risk: bool,

    /// Base URL of the external risk engine (used unless `proxy_local_risk`).
    #[arg(long, env = "RISK_ENGINE_URL")]
    pub risk_engine_url: Option<Url>,

    /// Enable the legacy-dialect compatibility adapter when forwarding to
    /// the external risk engine.
    #[arg(long, env = "RISK_ENGINE_COMPAT", default_value_t = false)]
    pub risk_engine_compat: bool,

    /// Bearer token attached to forwarded risk-engine requests.
    #[arg(long, env = "RISK_INTERNAL_TOKEN", default_value = "")]
    pub risk_internal_token: String,

    /// TTL (seconds) for locally-stored risk sessions and traces.
    #[arg(long, env = "LOCAL_TTL_SECONDS", default_value_t = 900)]
    pub local_ttl_seconds: u64,

    /// Maximum number of sessions (and, independently, traces) held by the
    /// local risk store.
    #[arg(long, env = "LOCAL_STORE_CAPACITY", default_value_t = 10_000)]
    pub local_store_capacity: usize,
}

impl Config {
    /// Parses configuration from CLI args and environment, loading `.env`
    /// first via `dotenvy::dotenv().ok()`.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Config::parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_seconds)
    }

    /// The network → EIP-155 chain id map used to build the EIP-712 domain
    /// for AP2 evidence-signature recovery (spec.md §4.4 step 9). Defaults
    /// match spec.md §6; not currently overridable via env (no established
    /// wire format for a map-valued env var in this codebase), but kept as
    /// its own function so a future config source can replace it without
    /// touching call sites.
    pub fn network_chain_ids(&self) -> HashMap<String, u64> {
        let mut map = HashMap::new();
        map.insert("base".to_string(), 8453);
        map.insert("base-sepolia".to_string(), 84532);
        map
    }
}

pub mod config_defaults {
    pub const DEFAULT_PORT: u16 = 8402;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_chain_ids_has_expected_defaults() {
        let config = Config::parse_from(["x402-risk-gateway"]);
        let map = config.network_chain_ids();
        assert_eq!(map.get("base"), Some(&8453));
        assert_eq!(map.get("base-sepolia"), Some(&84532));
    }

    #[test]
    fn defaults_match_documented_table() {
        let config = Config::parse_from(["x402-risk-gateway"]);
        assert_eq!(config.request_timeout_seconds, 15);
        assert!(config.debug_enabled);
        assert!(!config.settle_risk_enabled);
        assert!(!config.proxy_local_risk);
        assert_eq!(config.local_ttl_seconds, 900);
    }
}
