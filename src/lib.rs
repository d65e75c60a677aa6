//! Agent-payment gateway: a risk-session/trace store, an AP2 evidence
//! verifier, and an x402 facilitator proxy, intermediating the two-phase
//! HTTP payment protocol between buyer-side agents and seller resource
//! endpoints.
//!
//! # Roles
//!
//! - **Risk store and router** ([`risk`]): issues `sid`/`tid`, accepts
//!   opaque agent-trace documents, and evaluates risk either locally or by
//!   forwarding to an external risk engine.
//! - **AP2 verifier** ([`ap2`]): the cryptographic invariant-checker that
//!   binds a payment authorization to agent-reasoning evidence — origin
//!   binding, payment-hash binding, TTL, merchant identity, and optional
//!   EIP-712 signature recovery.
//! - **Facilitator proxy** ([`proxy`]): `verify`/`settle` endpoints that
//!   gate on a risk decision, sanitize payment requirements, and forward to
//!   an upstream payment facilitator.
//! - **Trace collector** ([`trace_collector`]): client-side capture of an
//!   agent's reasoning-stream events into the canonical trace document
//!   submitted to `/risk/trace`.
//!
//! # Modules
//!
//! - [`ap2`] — evidence decoding, policy extraction, and the ordered
//!   verification pipeline.
//! - [`config`] — startup configuration (CLI flags / environment).
//! - [`error`] — the fixed error-code taxonomy and its HTTP/JSON rendering.
//! - [`headers`] — parsers/builders for `X-PAYMENT-SECURE`, `X-AP2-EVIDENCE`,
//!   and the risk-id headers.
//! - [`health`] — the `/health` liveness endpoint.
//! - [`payment`] — protocol-agnostic payment context and requirements types.
//! - [`proxy`] — the facilitator proxy's HTTP handlers.
//! - [`request_id`] — per-request identifier propagation.
//! - [`risk`] — the risk-session/trace store, local evaluator, forwarding
//!   adapter, and public router.
//! - [`state`] — shared application state threaded through handlers.
//! - [`timestamp`] — Unix timestamp type.
//! - [`trace_collector`] — client-side agent-stream capture (C6).
//! - [`trace_context`] — W3C distributed-trace context, repurposed as a
//!   side-channel for `tid`.
//! - [`util`] — base64, canonical JSON, telemetry, and graceful-shutdown
//!   helpers.

pub mod ap2;
pub mod config;
pub mod error;
pub mod headers;
pub mod health;
pub mod payment;
pub mod proxy;
pub mod request_id;
pub mod risk;
pub mod state;
pub mod timestamp;
pub mod trace_collector;
pub mod trace_context;
pub mod util;
