//! Miner dispatch client.
//!
//! Sends the challenge text to one miner endpoint and returns its
//! compressed response. Timeouts are enforced by the dispatch stage, not
//! here; this client only reports transport failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{check_status, http_client};
use crate::error::{Result, Service, ValidatorError};

/// Capability: ask one miner to compress a text.
#[async_trait]
pub trait MinerClient: Send + Sync {
    async fn compress(&self, endpoint: &str, text: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompressRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompressResponse {
    compressed_text: String,
}

/// reqwest-backed miner client, shared across all per-worker dispatches
pub struct HttpMinerClient {
    client: reqwest::Client,
}

impl HttpMinerClient {
    /// `timeout` is a transport-level ceiling; the dispatch stage applies
    /// the tighter per-call and round deadlines on top.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(Service::Miner, timeout)?,
        })
    }
}

#[async_trait]
impl MinerClient for HttpMinerClient {
    async fn compress(&self, endpoint: &str, text: &str) -> Result<String> {
        let url = format!("{}/compress", endpoint.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .json(&CompressRequest { text })
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Miner, e))?;

        check_status(Service::Miner, &resp)?;

        let body: CompressResponse = resp
            .json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Miner, e))?;

        Ok(body.compressed_text)
    }
}
