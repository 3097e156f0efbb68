//! Chain sidecar client.
//!
//! The sidecar holds the wallet and talks to the consensus chain; the
//! validator only reads the metagraph (for the current epoch) and submits
//! weight vectors. A rejected submission with an `epoch` field in the
//! error body maps to `StaleEpoch`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{check_status, http_client};
use crate::error::{Result, Service, ValidatorError};
use crate::types::{WeightVector, WorkerId};

/// Metagraph snapshot from the sidecar
#[derive(Debug, Clone, Deserialize)]
pub struct MetagraphInfo {
    /// Current consensus epoch
    pub epoch: u64,
    /// UIDs registered on the subnet
    #[serde(default)]
    pub workers: Vec<WorkerId>,
}

/// Capability: read chain state and submit weights.
#[async_trait]
pub trait ChainSidecar: Send + Sync {
    async fn metagraph(&self) -> Result<MetagraphInfo>;

    /// Submit the weight vector for `epoch`. `StaleEpoch` means the chain
    /// moved on since the metagraph was read.
    async fn set_weights(&self, epoch: u64, weights: &WeightVector) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct WeightEntry {
    worker_id: WorkerId,
    weight: f64,
}

#[derive(Debug, Serialize)]
struct SetWeightsRequest {
    epoch: u64,
    weights: Vec<WeightEntry>,
}

#[derive(Debug, Deserialize)]
struct SetWeightsReply {
    #[serde(default)]
    ack: bool,
    #[serde(default)]
    error: Option<String>,
    /// Current epoch, echoed back when the submission was stale
    #[serde(default)]
    epoch: Option<u64>,
}

/// reqwest-backed sidecar client
pub struct HttpChainSidecar {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChainSidecar {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(Service::Chain, timeout)?,
        })
    }
}

#[async_trait]
impl ChainSidecar for HttpChainSidecar {
    async fn metagraph(&self) -> Result<MetagraphInfo> {
        let resp = self
            .client
            .get(format!("{}/metagraph", self.base_url))
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Chain, e))?;

        check_status(Service::Chain, &resp)?;

        resp.json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Chain, e))
    }

    async fn set_weights(&self, epoch: u64, weights: &WeightVector) -> Result<()> {
        let request = SetWeightsRequest {
            epoch,
            weights: weights
                .iter()
                .map(|(worker_id, weight)| WeightEntry { worker_id, weight })
                .collect(),
        };

        let resp = self
            .client
            .post(format!("{}/set-weights", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Chain, e))?;

        // 409 carries a structured stale-epoch body rather than a plain error
        if resp.status() == reqwest::StatusCode::CONFLICT {
            let reply: SetWeightsReply = resp
                .json()
                .await
                .map_err(|e| ValidatorError::unavailable(Service::Chain, e))?;
            return Err(ValidatorError::StaleEpoch {
                submitted: epoch,
                current: reply.epoch.unwrap_or(epoch),
            });
        }

        check_status(Service::Chain, &resp)?;

        let reply: SetWeightsReply = resp
            .json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Chain, e))?;

        if !reply.ack {
            return Err(ValidatorError::InvalidResponse {
                service: Service::Chain,
                reason: reply.error.unwrap_or_else(|| "no ack".to_string()),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::collections::BTreeMap;

    fn sample_weights() -> WeightVector {
        let mut scores = BTreeMap::new();
        scores.insert(1u16, 0.25);
        scores.insert(2u16, 0.75);
        WeightVector::normalize(&scores).unwrap()
    }

    #[tokio::test]
    async fn test_metagraph() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/metagraph");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"epoch": 42, "workers": [1, 2, 3]}"#);
        });

        let chain = HttpChainSidecar::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let info = chain.metagraph().await.unwrap();
        assert_eq!(info.epoch, 42);
        assert_eq!(info.workers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_set_weights_ack() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/set-weights")
                .json_body_partial(r#"{"epoch": 42}"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ack": true}"#);
        });

        let chain = HttpChainSidecar::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        chain.set_weights(42, &sample_weights()).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_set_weights_stale_epoch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/set-weights");
            then.status(409)
                .header("content-type", "application/json")
                .body(r#"{"ack": false, "error": "stale epoch", "epoch": 43}"#);
        });

        let chain = HttpChainSidecar::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let err = chain.set_weights(42, &sample_weights()).await.unwrap_err();
        match err {
            ValidatorError::StaleEpoch { submitted, current } => {
                assert_eq!(submitted, 42);
                assert_eq!(current, 43);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
