//! HTTP client for the upstream payment facilitator (spec.md §4.5 steps 7-8).
//!
//! Follows `FacilitatorClient` directly
//! (`crates/x402-axum/src/facilitator_client.rs`): a cheap-to-clone
//! `reqwest::Client`, one `post_json` helper shared by `/verify` and
//! `/settle`, and a typed error that distinguishes transport failure, a
//! non-200 status (propagated verbatim per spec.md §4.5 step 8), and a
//! non-JSON body (mapped to `502`).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}")]
    Status { status: StatusCode, body: Value },
    #[error("upstream response was not valid JSON")]
    MalformedJson,
}

#[derive(Clone)]
pub struct UpstreamFacilitatorClient {
    client: Client,
    verify_url: Url,
    settle_url: Url,
}

impl UpstreamFacilitatorClient {
    pub fn new(verify_url: Url, settle_url: Url, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        UpstreamFacilitatorClient {
            client,
            verify_url,
            settle_url,
        }
    }

    pub async fn verify(&self, payload: &Value) -> Result<UpstreamResponse, UpstreamError> {
        self.post_json(self.verify_url.clone(), payload).await
    }

    pub async fn settle(&self, payload: &Value) -> Result<UpstreamResponse, UpstreamError> {
        self.post_json(self.settle_url.clone(), payload).await
    }

    async fn post_json(&self, url: Url, payload: &Value) -> Result<UpstreamResponse, UpstreamError> {
        let response = self.client.post(url.clone()).json(payload).send().await?;
        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&body_text).map_err(|_| UpstreamError::MalformedJson)?;
        if status != StatusCode::OK {
            return Err(UpstreamError::Status { status, body });
        }
        Ok(UpstreamResponse { url, status, body })
    }
}

/// A completed upstream call: kept verbatim for the debug snapshot
/// (spec.md §4.5 "Debug snapshot").
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub url: Url,
    pub status: StatusCode,
    pub body: Value,
}
