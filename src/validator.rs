//! Round state machine and scheduler.
//!
//! Drives the repeating cycle `Idle → Fetching → Dispatching → Scoring →
//! Aggregating → (CommitDue? → Committing) → Idle`. Rounds are strictly
//! serialized: the `ScoreBook` is written by exactly one round at a time,
//! which is what makes the cross-round EMA race-free by construction.
//!
//! Failure containment follows the taxonomy: per-worker failures stay in
//! their `Attempt`/`ScoreRecord`, a failed round backs off and retries,
//! and nothing short of task cancellation stops the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregator::ScoreBook;
use crate::backoff::Backoff;
use crate::client::{
    ChainSidecar, ChallengeSource, HttpChainSidecar, HttpChallengeSource, HttpMinerClient,
    HttpScoringService, HttpWorkerRegistry, MinerClient, ScoringService, WorkerRegistry,
};
use crate::commit::{CommitOutcome, WeightCommitter};
use crate::config::ValidatorConfig;
use crate::dispatch::{dispatch_round, DispatchLimits};
use crate::error::Result;
use crate::events::{EventLog, Stage};
use crate::scoring::collect_scores;
use crate::types::{Round, Worker};

/// Summary of one completed round, mainly for tests and logs.
#[derive(Debug)]
pub struct RoundReport {
    pub round_id: String,
    pub seq: u64,
    pub attempts: usize,
    pub successful_attempts: usize,
    pub scored: usize,
    pub commit: Option<CommitOutcome>,
}

/// The validator core: owns the collaborators, the score book and the
/// commit state, and serializes rounds.
pub struct ValidatorCore {
    config: ValidatorConfig,
    registry: Arc<dyn WorkerRegistry>,
    synthesis: Arc<dyn ChallengeSource>,
    scoring: Arc<dyn ScoringService>,
    miner: Arc<dyn MinerClient>,
    committer: WeightCommitter,
    scores: ScoreBook,
    events: Arc<EventLog>,
    seq: u64,
}

impl ValidatorCore {
    pub fn new(
        config: ValidatorConfig,
        registry: Arc<dyn WorkerRegistry>,
        synthesis: Arc<dyn ChallengeSource>,
        scoring: Arc<dyn ScoringService>,
        miner: Arc<dyn MinerClient>,
        chain: Arc<dyn ChainSidecar>,
    ) -> Self {
        let committer = WeightCommitter::new(chain, config.commit.clone());
        let scores = ScoreBook::new(config.aggregation.clone());
        Self {
            config,
            registry,
            synthesis,
            scoring,
            miner,
            committer,
            scores,
            events: Arc::new(EventLog::default()),
            seq: 0,
        }
    }

    /// Wire up the HTTP clients from config. Fails when a transport
    /// client cannot be built with its configured timeout.
    pub fn from_config(config: ValidatorConfig) -> Result<Self> {
        let timeout = config.services.request_timeout();
        let registry = Arc::new(HttpWorkerRegistry::new(
            &config.services.registry_url,
            timeout,
        )?);
        let synthesis = Arc::new(HttpChallengeSource::new(
            &config.services.synthesis_url,
            timeout,
        )?);
        let scoring = Arc::new(HttpScoringService::new(
            &config.services.scoring_url,
            timeout,
        )?);
        // Transport ceiling slightly above the per-call timeout so the
        // dispatch deadline is the one that fires
        let miner = Arc::new(HttpMinerClient::new(
            config.round.per_call_timeout() + Duration::from_secs(1),
        )?);
        let chain = Arc::new(HttpChainSidecar::new(&config.services.chain_url, timeout)?);

        Ok(Self::new(config, registry, synthesis, scoring, miner, chain))
    }

    pub fn events(&self) -> Arc<EventLog> {
        Arc::clone(&self.events)
    }

    /// Run rounds forever, backing off after failed rounds. Cancel the
    /// future to stop.
    pub async fn run(&mut self) {
        info!("validator loop starting");
        let mut backoff = Backoff::new(
            Duration::from_secs(self.config.round.backoff_base_secs),
            Duration::from_secs(self.config.round.backoff_max_secs),
        );

        loop {
            match self.run_round().await {
                Ok(report) => {
                    backoff.reset();
                    info!(
                        round_id = %report.round_id,
                        attempts = report.attempts,
                        scored = report.scored,
                        "round complete"
                    );
                    sleep(self.config.round.forward_sleep()).await;
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    error!(error = %err, retry_in_secs = delay.as_secs(), "round failed");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Drive one round through every stage. An `Err` means the round was
    /// abandoned before dispatch (no challenge or no registry); the score
    /// book is untouched in that case.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        self.seq += 1;
        let seq = self.seq;
        let round_id = short_id();

        // Fetching
        self.events
            .running(&round_id, seq, Stage::Fetching, "fetching challenge");
        let challenge = match self.synthesis.fetch_challenge().await {
            Ok(text) => text,
            Err(err) => {
                self.events
                    .finished(&round_id, seq, &format!("abandoned: {err}"));
                return Err(err);
            }
        };

        let workers = match self.registry.fetch_eligible_workers().await {
            Ok(workers) => workers,
            Err(err) => {
                self.events
                    .finished(&round_id, seq, &format!("abandoned: {err}"));
                return Err(err);
            }
        };

        let mut round = Round::with_id(round_id.clone(), seq, challenge);

        if workers.is_empty() {
            return Ok(self.close_empty_round(&round, "no eligible workers").await);
        }

        let available = self.reserve_credits(&round, workers).await;
        if available.is_empty() {
            return Ok(self.close_empty_round(&round, "all workers rate-limited").await);
        }

        // Dispatching
        self.events.running(
            &round.id,
            seq,
            Stage::Dispatching,
            &format!("{} workers", available.len()),
        );
        let limits = DispatchLimits {
            max_concurrency: self.config.round.max_concurrency,
            per_call_timeout: self.config.round.per_call_timeout(),
            round_deadline: self.config.round.deadline(),
            max_compress_rate: self.config.round.max_compress_rate,
        };
        round.attempts =
            dispatch_round(Arc::clone(&self.miner), &round.challenge, &available, limits).await;

        for attempt in round.attempts.iter().filter(|a| !a.is_success()) {
            let reason = attempt
                .failure
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_default();
            self.events
                .worker_outcome(&round.id, seq, Stage::Dispatching, attempt.worker, &reason);
        }

        // Scoring
        let successful = round.successful_attempts().count();
        self.events.running(
            &round.id,
            seq,
            Stage::Scoring,
            &format!("{successful} responses"),
        );
        let scored = collect_scores(
            Arc::clone(&self.scoring),
            &round,
            self.config.round.max_concurrency,
        )
        .await;
        for (worker, err) in &scored.excluded {
            self.events
                .worker_outcome(&round.id, seq, Stage::Scoring, *worker, &err.to_string());
        }

        // Aggregating: exactly once per completed round, even when it
        // produced zero records, so absence decay ticks
        self.events.running(
            &round.id,
            seq,
            Stage::Aggregating,
            &format!("{} records", scored.records.len()),
        );
        self.scores.apply_round(&scored.records);

        // Committing, gated on wall time
        let commit = self.run_commit_stage(&round.id, seq).await;

        let outcome_note = if scored.records.is_empty() {
            "empty: no scored responses".to_string()
        } else {
            format!(
                "attempts={} scored={}",
                round.attempts.len(),
                scored.records.len()
            )
        };
        self.events.finished(&round.id, seq, &outcome_note);

        Ok(self.report(&round, scored.records.len(), commit))
    }

    /// Reserve a dispatch credit per worker; denial or a failed credit
    /// check means skipping the worker for this round only.
    async fn reserve_credits(&self, round: &Round, workers: Vec<Worker>) -> Vec<Worker> {
        let mut available = Vec::with_capacity(workers.len());
        for worker in workers {
            match self.registry.check_and_reserve_credit(worker.uid).await {
                Ok(true) => available.push(worker),
                Ok(false) => {
                    self.events.worker_outcome(
                        &round.id,
                        round.seq,
                        Stage::Fetching,
                        worker.uid,
                        "credit_denied",
                    );
                }
                Err(err) => {
                    warn!(worker = worker.uid, error = %err, "credit check failed; skipping");
                    self.events.worker_outcome(
                        &round.id,
                        round.seq,
                        Stage::Fetching,
                        worker.uid,
                        "credit_check_failed",
                    );
                }
            }
        }
        available
    }

    /// An empty round still completed: absence bookkeeping advances and a
    /// due commit still fires, so a drained registry cannot starve the
    /// commit schedule while rounds keep closing.
    async fn close_empty_round(&mut self, round: &Round, reason: &str) -> RoundReport {
        info!(round_id = %round.id, reason, "empty round");
        self.scores.apply_round(&[]);
        let commit = self.run_commit_stage(&round.id, round.seq).await;
        self.events
            .finished(&round.id, round.seq, &format!("empty: {reason}"));
        self.report(round, 0, commit)
    }

    /// Wall-clock gated commit stage, shared by full and empty rounds.
    async fn run_commit_stage(&mut self, round_id: &str, seq: u64) -> Option<CommitOutcome> {
        match self
            .committer
            .commit_cycle(self.scores.weight_vector().as_ref())
            .await
        {
            CommitOutcome::NotDue => None,
            outcome => {
                self.events.set_weights(round_id, seq, outcome.as_str());
                if let CommitOutcome::Missed { attempts } = &outcome {
                    warn!(attempts = *attempts, "weight commit missed this cycle");
                }
                Some(outcome)
            }
        }
    }

    fn report(&self, round: &Round, scored: usize, commit: Option<CommitOutcome>) -> RoundReport {
        RoundReport {
            round_id: round.id.clone(),
            seq: round.seq,
            attempts: round.attempts.len(),
            successful_attempts: round.successful_attempts().count(),
            scored,
            commit,
        }
    }

    /// Read-only view of the score book, for tests and diagnostics.
    pub fn scores(&self) -> &ScoreBook {
        &self.scores
    }
}

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}
