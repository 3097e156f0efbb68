//! Scoring service client.
//!
//! Submits (original, compressed) pairs and receives the raw preference
//! score, optionally with the service's own compression and diversity
//! estimates. Range validation happens in the scoring stage when the
//! reply is turned into a `ScoreRecord`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{check_status, http_client};
use crate::error::{Result, Service, ValidatorError};

/// Raw scoring reply. `compression` and `diversity` may be absent, in
/// which case the validator computes them locally from the texts.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RawScore {
    /// Preference score from the scoring model
    pub r: f64,
    /// Compression ratio, if the service measured it
    #[serde(default)]
    pub c: Option<f64>,
    /// Diversity score, if the service measured it
    #[serde(default)]
    pub d: Option<f64>,
}

/// Capability: score one compressed response against its original.
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, original: &str, compressed: &str) -> Result<RawScore>;
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    original: &'a str,
    compressed: &'a str,
}

/// reqwest-backed scoring client
pub struct HttpScoringService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpScoringService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(Service::Scoring, timeout)?,
        })
    }
}

#[async_trait]
impl ScoringService for HttpScoringService {
    async fn score(&self, original: &str, compressed: &str) -> Result<RawScore> {
        let resp = self
            .client
            .post(format!("{}/score", self.base_url))
            .json(&ScoreRequest {
                original,
                compressed,
            })
            .send()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Scoring, e))?;

        check_status(Service::Scoring, &resp)?;

        resp.json()
            .await
            .map_err(|e| ValidatorError::unavailable(Service::Scoring, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_score_full_reply() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/score");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"r": 0.8, "c": 0.5, "d": 0.2}"#);
        });

        let scoring = HttpScoringService::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let score = scoring.score("original", "orig").await.unwrap();
        assert_eq!(score.r, 0.8);
        assert_eq!(score.c, Some(0.5));
        assert_eq!(score.d, Some(0.2));
    }

    #[tokio::test]
    async fn test_score_preference_only_reply() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/score");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"r": 0.9}"#);
        });

        let scoring = HttpScoringService::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let score = scoring.score("original", "orig").await.unwrap();
        assert_eq!(score.r, 0.9);
        assert_eq!(score.c, None);
        assert_eq!(score.d, None);
    }

    #[tokio::test]
    async fn test_score_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/score");
            then.status(502);
        });

        let scoring = HttpScoringService::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let err = scoring.score("original", "orig").await.unwrap_err();
        assert_eq!(err.service(), Some(Service::Scoring));
    }
}
