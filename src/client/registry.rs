//! Worker registry client.
//!
//! The registry owns the set of eligible miners and the per-worker
//! credit/rate-limit ledger. The validator reads both; it never writes
//! worker state beyond reserving credit for one challenge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{check_status, http_client};
use crate::error::{Result, Service, ValidatorError};
use crate::types::{Worker, WorkerId};

/// Capability: resolve eligible workers and reserve dispatch credit.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Current set of eligible workers with their endpoints.
    async fn fetch_eligible_workers(&self) -> Result<Vec<Worker>>;

    /// Reserve one challenge credit for `worker`. `Ok(false)` means the
    /// worker is rate-limited and must be skipped this round - it is not
    /// an error.
    async fn check_and_reserve_credit(&self, worker: WorkerId) -> Result<bool>;
}

#[derive(Debug, Serialize)]
struct ReserveRequest {
    worker_id: WorkerId,
}

#[derive(Debug, Deserialize)]
struct ReserveResponse {
    allowed: bool,
}

/// reqwest-backed registry client
pub struct HttpWorkerRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWorkerRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(Service::Registry, timeout)?,
        })
    }
}

#[async_trait]
impl WorkerRegistry for HttpWorkerRegistry {
    async fn fetch_eligible_workers(&self) -> Result<Vec<Worker>> {
        let resp = self
            .client
            .get(format!("{}/eligible-workers", self.base_url))
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Registry, e))?;

        check_status(Service::Registry, &resp)?;

        resp.json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Registry, e))
    }

    async fn check_and_reserve_credit(&self, worker: WorkerId) -> Result<bool> {
        let resp = self
            .client
            .post(format!("{}/credit/reserve", self.base_url))
            .json(&ReserveRequest { worker_id: worker })
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Registry, e))?;

        check_status(Service::Registry, &resp)?;

        let body: ReserveResponse = resp
            .json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Registry, e))?;

        Ok(body.allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_fetch_eligible_workers() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/eligible-workers");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"id": 1, "endpoint": "http://miner1:8091"}, {"id": 5, "endpoint": "http://miner5:8091"}]"#);
        });

        let registry = HttpWorkerRegistry::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let workers = registry.fetch_eligible_workers().await.unwrap();

        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].uid, 1);
        assert_eq!(workers[1].endpoint, "http://miner5:8091");
    }

    #[tokio::test]
    async fn test_fetch_workers_server_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/eligible-workers");
            then.status(503);
        });

        let registry = HttpWorkerRegistry::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let err = registry.fetch_eligible_workers().await.unwrap_err();

        assert_eq!(err.service(), Some(Service::Registry));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_reserve_credit_denied_is_not_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/credit/reserve")
                .json_body(serde_json::json!({"worker_id": 9}));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"allowed": false}"#);
        });

        let registry = HttpWorkerRegistry::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let allowed = registry.check_and_reserve_credit(9).await.unwrap();
        assert!(!allowed);
    }
}
