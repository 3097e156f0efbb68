//! Error taxonomy for the validator core.
//!
//! Every variant is recoverable by design of the round loop: per-worker
//! failures exclude one Attempt or ScoreRecord, stage failures send the
//! scheduler back to Idle with a backoff, and commit failures are retried
//! on the next cycle. Nothing here terminates the process.

use thiserror::Error;

use crate::types::WorkerId;

/// External collaborator that produced a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Worker registry / credit ledger
    Registry,
    /// Challenge synthesis service
    Synthesis,
    /// Compression scoring service
    Scoring,
    /// A miner endpoint
    Miner,
    /// Chain sidecar (metagraph + set-weights)
    Chain,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Registry => write!(f, "registry"),
            Service::Synthesis => write!(f, "synthesis"),
            Service::Scoring => write!(f, "scoring"),
            Service::Miner => write!(f, "miner"),
            Service::Chain => write!(f, "chain"),
        }
    }
}

/// Validator error type
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: Service, reason: String },

    #[error("score component {field}={value} for worker {worker} outside [0,1]")]
    InvalidScoreRange {
        worker: WorkerId,
        field: &'static str,
        value: f64,
    },

    #[error("call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("weight submission rejected: epoch {submitted} is stale (current {current})")]
    StaleEpoch { submitted: u64, current: u64 },

    #[error("unexpected response from {service}: {reason}")]
    InvalidResponse { service: Service, reason: String },
}

impl ValidatorError {
    /// Build an `Unavailable` from any transport error.
    pub fn unavailable(service: Service, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            service,
            reason: err.to_string(),
        }
    }

    /// The collaborator this error originated from, if any.
    pub fn service(&self) -> Option<Service> {
        match self {
            Self::Unavailable { service, .. } | Self::InvalidResponse { service, .. } => {
                Some(*service)
            }
            _ => None,
        }
    }
}

/// Result type for validator operations
pub type Result<T> = std::result::Result<T, ValidatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidatorError::unavailable(Service::Registry, "connection refused");
        assert_eq!(err.to_string(), "registry unavailable: connection refused");

        let err = ValidatorError::InvalidScoreRange {
            worker: 7,
            field: "raw",
            value: 1.2,
        };
        assert!(err.to_string().contains("worker 7"));
        assert!(err.to_string().contains("outside [0,1]"));
    }

    #[test]
    fn test_service_attribution() {
        let err = ValidatorError::unavailable(Service::Chain, "502");
        assert_eq!(err.service(), Some(Service::Chain));

        let err = ValidatorError::Timeout { elapsed_ms: 1200 };
        assert_eq!(err.service(), None);
    }
}
