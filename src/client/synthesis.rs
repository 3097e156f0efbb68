//! Challenge synthesis client.
//!
//! Fetches the original text each round's challenge is built from. A
//! failed fetch abandons the round; the scheduler retries after backoff.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::client::{check_status, http_client};
use crate::error::{Result, Service, ValidatorError};

/// Capability: produce one synthetic challenge text.
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    async fn fetch_challenge(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    text: String,
}

/// reqwest-backed synthesis client
pub struct HttpChallengeSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChallengeSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(Service::Synthesis, timeout)?,
        })
    }
}

#[async_trait]
impl ChallengeSource for HttpChallengeSource {
    async fn fetch_challenge(&self) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Synthesis, e))?;

        check_status(Service::Synthesis, &resp)?;

        let body: SynthesizeResponse = resp
            .json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Synthesis, e))?;

        if body.text.is_empty() {
            return Err(ValidatorError::InvalidResponse {
                service: Service::Synthesis,
                reason: "empty challenge text".to_string(),
            });
        }

        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_fetch_challenge() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/synthesize");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"text": "a long passage to be compressed"}"#);
        });

        let source = HttpChallengeSource::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let text = source.fetch_challenge().await.unwrap();
        assert_eq!(text, "a long passage to be compressed");
    }

    #[tokio::test]
    async fn test_empty_challenge_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/synthesize");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"text": ""}"#);
        });

        let source = HttpChallengeSource::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let err = source.fetch_challenge().await.unwrap_err();
        assert!(matches!(err, ValidatorError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/synthesize");
            then.status(500);
        });

        let source = HttpChallengeSource::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let err = source.fetch_challenge().await.unwrap_err();
        assert_eq!(err.service(), Some(Service::Synthesis));
    }
}
