//! Utility types and functions shared across the gateway.
//!
//! - [`b64`] - Base64 encoding/decoding utilities
//! - [`canonical_json`] - Deterministic JSON serialization (sorted keys, no whitespace)
//! - [`sig_down`] - Graceful shutdown signal handling
//! - [`telemetry`] - OpenTelemetry tracing setup

pub mod b64;
pub mod canonical_json;
pub mod sig_down;
pub mod telemetry;

pub use sig_down::*;
pub use telemetry::*;
