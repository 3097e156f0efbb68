//! Weight commit policy.
//!
//! Commits are gated on wall time, not round count: a cycle fires only
//! when the minimum interval since the last successful commit has
//! elapsed, so a burst of fast rounds cannot over-commit and a slow
//! pipeline still commits as soon as a round completes. Within a cycle
//! the submission is retried a bounded number of times with backoff;
//! exhaustion is a recoverable miss - the next cycle retries with fresher
//! scores.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::client::ChainSidecar;
use crate::config::CommitConfig;
use crate::error::ValidatorError;
use crate::types::WeightVector;

/// Resolution of one commit cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Vector submitted and acknowledged
    Committed { epoch: u64, workers: usize },
    /// Minimum interval since the last successful commit has not elapsed
    NotDue,
    /// This epoch already carries our vector; redundant submission skipped
    AlreadyCommitted { epoch: u64 },
    /// No worker has a positive running score yet
    NothingToCommit,
    /// All attempts this cycle failed; will retry next cycle
    Missed { attempts: u32 },
}

impl CommitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitOutcome::Committed { .. } => "committed",
            CommitOutcome::NotDue => "not_due",
            CommitOutcome::AlreadyCommitted { .. } => "already_committed",
            CommitOutcome::NothingToCommit => "nothing_to_commit",
            CommitOutcome::Missed { .. } => "missed",
        }
    }
}

/// Stateful commit client wrapping the chain sidecar.
pub struct WeightCommitter {
    chain: Arc<dyn ChainSidecar>,
    config: CommitConfig,
    last_commit_at: Option<Instant>,
    last_epoch: Option<u64>,
}

impl WeightCommitter {
    pub fn new(chain: Arc<dyn ChainSidecar>, config: CommitConfig) -> Self {
        Self {
            chain,
            config,
            last_commit_at: None,
            last_epoch: None,
        }
    }

    /// Whether the minimum interval since the last successful commit has
    /// elapsed. True before the first commit.
    pub fn due(&self) -> bool {
        self.last_commit_at
            .map(|at| at.elapsed() >= self.config.min_interval())
            .unwrap_or(true)
    }

    /// Epoch of the last acknowledged submission.
    pub fn last_epoch(&self) -> Option<u64> {
        self.last_epoch
    }

    /// Run one commit cycle for `weights`.
    pub async fn commit_cycle(&mut self, weights: Option<&WeightVector>) -> CommitOutcome {
        if !self.due() {
            return CommitOutcome::NotDue;
        }
        let Some(weights) = weights else {
            return CommitOutcome::NothingToCommit;
        };

        let mut backoff = Backoff::new(
            Duration::from_secs(self.config.retry_base_secs),
            self.config.min_interval(),
        );

        for attempt in 1..=self.config.max_attempts {
            match self.try_submit(weights).await {
                Ok(outcome) => {
                    if let CommitOutcome::Committed { epoch, workers } = outcome {
                        info!(epoch, workers, "weight vector committed");
                        self.last_commit_at = Some(Instant::now());
                        self.last_epoch = Some(epoch);
                    }
                    return outcome;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "weight submission failed");
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
            }
        }

        warn!(
            attempts = self.config.max_attempts,
            "commit cycle exhausted; will retry next cycle"
        );
        CommitOutcome::Missed {
            attempts: self.config.max_attempts,
        }
    }

    /// One submission: read the current epoch, skip if we already
    /// committed it, otherwise submit. A `StaleEpoch` reply falls through
    /// to the retry loop, which rereads the metagraph.
    async fn try_submit(
        &self,
        weights: &WeightVector,
    ) -> Result<CommitOutcome, ValidatorError> {
        let metagraph = self.chain.metagraph().await?;

        if self.last_epoch == Some(metagraph.epoch) {
            return Ok(CommitOutcome::AlreadyCommitted {
                epoch: metagraph.epoch,
            });
        }

        self.chain.set_weights(metagraph.epoch, weights).await?;

        Ok(CommitOutcome::Committed {
            epoch: metagraph.epoch,
            workers: weights.len(),
        })
    }
}
