//! Parsers/builders for the gateway's structured request headers (spec.md §4.1).
//!
//! Each parser fails with a single error kind per header family; none of them
//! ever partially accept a malformed value.

pub mod evidence_header;
pub mod payment_secure;
pub mod risk_ids;

use thiserror::Error;

/// A single error kind per header family, as spec.md §4.1 requires. The
/// `*Unsupported` variants are distinct from `PaymentSecure`/`Evidence`
/// because a version/prefix mismatch maps to its own error code
/// (`TRACE_HEADER_UNSUPPORTED`/`EVIDENCE_HEADER_UNSUPPORTED`, spec.md §7),
/// separate from a malformed-but-recognized-version header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("X-PAYMENT-SECURE: {0}")]
    PaymentSecure(String),
    #[error("X-PAYMENT-SECURE: unsupported version: {0}")]
    PaymentSecureUnsupported(String),
    #[error("X-AP2-EVIDENCE: {0}")]
    Evidence(String),
    #[error("X-AP2-EVIDENCE: unsupported version: {0}")]
    EvidenceUnsupported(String),
    #[error("risk id header: {0}")]
    RiskId(String),
}
