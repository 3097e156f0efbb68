//! Validator configuration.
//!
//! Every knob lives in a nested config struct with a sane default, and can
//! be overridden from the environment (`CONDENSE_*` variables). The
//! defaults mirror the sidecar port layout of a standard deployment:
//! chain sidecar on 9100, registry on 9101, scoring on 9102, synthesis on
//! 9103.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Complete validator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub services: ServicesConfig,
    pub round: RoundConfig,
    pub aggregation: AggregationConfig,
    pub commit: CommitConfig,
}

/// Base URLs of the four external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Worker registry / credit ledger
    pub registry_url: String,
    /// Challenge synthesis service
    pub synthesis_url: String,
    /// Compression scoring service
    pub scoring_url: String,
    /// Chain sidecar holding the wallet
    pub chain_url: String,
    /// Transport timeout applied to the registry/synthesis/scoring/chain
    /// clients (per-worker dispatch has its own timeout in `RoundConfig`)
    pub request_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://localhost:9101".to_string(),
            synthesis_url: "http://localhost:9103".to_string(),
            scoring_url: "http://localhost:9102".to_string(),
            chain_url: "http://localhost:9100".to_string(),
            request_timeout_secs: 12,
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Round cadence and dispatch limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Shared deadline for the whole dispatch stage
    pub deadline_secs: u64,
    /// Timeout for a single worker call
    pub per_call_timeout_secs: u64,
    /// Maximum concurrent in-flight dispatches (and scoring calls)
    pub max_concurrency: usize,
    /// Pause between rounds
    pub forward_sleep_secs: u64,
    /// Responses compressed beyond this rate are rejected as degenerate
    pub max_compress_rate: f64,
    /// First retry delay after a failed round
    pub backoff_base_secs: u64,
    /// Retry delay ceiling
    pub backoff_max_secs: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 12,
            per_call_timeout_secs: 12,
            max_concurrency: 10,
            forward_sleep_secs: 8,
            max_compress_rate: 0.8,
            backoff_base_secs: 2,
            backoff_max_secs: 60,
        }
    }
}

impl RoundConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }

    pub fn forward_sleep(&self) -> Duration {
        Duration::from_secs(self.forward_sleep_secs)
    }
}

/// Smoothing and decay of per-worker running scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// EMA smoothing factor applied to each new composite score
    pub alpha: f64,
    /// Multiplicative decay per missed round once past the grace window
    pub decay: f64,
    /// Consecutive rounds a worker may be absent before decay starts
    pub absence_grace_rounds: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            decay: 0.9,
            absence_grace_rounds: 5,
        }
    }
}

/// Weight submission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Minimum seconds between successful commits
    pub min_interval_secs: u64,
    /// Submission attempts per commit cycle before giving up until next cycle
    pub max_attempts: u32,
    /// First retry delay within a commit cycle
    pub retry_base_secs: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 600,
            max_attempts: 3,
            retry_base_secs: 2,
        }
    }
}

impl CommitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

impl ValidatorConfig {
    /// Load defaults, then apply any `CONDENSE_*` environment overrides.
    /// Unparsable values are ignored with a warning rather than aborting
    /// startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_string("CONDENSE_REGISTRY_URL", &mut config.services.registry_url);
        override_string("CONDENSE_SYNTHESIS_URL", &mut config.services.synthesis_url);
        override_string("CONDENSE_SCORING_URL", &mut config.services.scoring_url);
        override_string("CONDENSE_CHAIN_URL", &mut config.services.chain_url);
        override_parsed(
            "CONDENSE_REQUEST_TIMEOUT_SECS",
            &mut config.services.request_timeout_secs,
        );

        override_parsed(
            "CONDENSE_ROUND_DEADLINE_SECS",
            &mut config.round.deadline_secs,
        );
        override_parsed(
            "CONDENSE_PER_CALL_TIMEOUT_SECS",
            &mut config.round.per_call_timeout_secs,
        );
        override_parsed("CONDENSE_MAX_CONCURRENCY", &mut config.round.max_concurrency);
        override_parsed(
            "CONDENSE_FORWARD_SLEEP_SECS",
            &mut config.round.forward_sleep_secs,
        );
        override_parsed(
            "CONDENSE_MAX_COMPRESS_RATE",
            &mut config.round.max_compress_rate,
        );
        override_parsed(
            "CONDENSE_BACKOFF_BASE_SECS",
            &mut config.round.backoff_base_secs,
        );
        override_parsed(
            "CONDENSE_BACKOFF_MAX_SECS",
            &mut config.round.backoff_max_secs,
        );

        override_parsed("CONDENSE_ALPHA", &mut config.aggregation.alpha);
        override_parsed("CONDENSE_DECAY", &mut config.aggregation.decay);
        override_parsed(
            "CONDENSE_ABSENCE_GRACE_ROUNDS",
            &mut config.aggregation.absence_grace_rounds,
        );

        override_parsed(
            "CONDENSE_COMMIT_MIN_INTERVAL_SECS",
            &mut config.commit.min_interval_secs,
        );
        override_parsed(
            "CONDENSE_COMMIT_MAX_ATTEMPTS",
            &mut config.commit.max_attempts,
        );
        override_parsed(
            "CONDENSE_COMMIT_RETRY_BASE_SECS",
            &mut config.commit.retry_base_secs,
        );

        config
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Ignoring unparsable {}={}", var, value),
        }
    }
}
