//! HTTP clients for the validator's external collaborators.
//!
//! Each collaborator is modeled as an async capability trait with one
//! reqwest-backed implementation, so the scheduler depends on the contract
//! rather than the transport and tests substitute in-memory doubles.

pub mod chain;
pub mod miner;
pub mod registry;
pub mod scoring;
pub mod synthesis;

pub use chain::{ChainSidecar, HttpChainSidecar, MetagraphInfo};
pub use miner::{HttpMinerClient, MinerClient};
pub use registry::{HttpWorkerRegistry, WorkerRegistry};
pub use scoring::{HttpScoringService, RawScore, ScoringService};
pub use synthesis::{ChallengeSource, HttpChallengeSource};

use std::time::Duration;

use crate::error::{Service, ValidatorError};

/// Build the reqwest client for `service` with its transport timeout.
/// Builder failure is startup-fatal for the caller, never silently
/// downgraded to a client without the timeout.
pub(crate) fn http_client(
    service: Service,
    timeout: Duration,
) -> Result<reqwest::Client, ValidatorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ValidatorError::unavailable(service, e))
}

/// Map a non-2xx reply to the unavailable taxonomy for `service`.
pub(crate) fn check_status(
    service: Service,
    resp: &reqwest::Response,
) -> Result<(), ValidatorError> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(ValidatorError::Unavailable {
            service,
            reason: format!("status {}", resp.status()),
        })
    }
}
