//! Challenge dispatch fan-out.
//!
//! Sends one challenge to every credit-available worker under a shared
//! round deadline. Each per-worker call runs in its own task, bounded by a
//! semaphore; the deadline cancels outstanding calls cooperatively via
//! `timeout_at`, so one silent worker never delays the rest. Responses are
//! validated on receipt (empty or over-compressed replies become failed
//! attempts) so a `Round` only ever carries attempts that are safe to
//! score.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::client::MinerClient;
use crate::scoring::validate_response;
use crate::types::{Attempt, AttemptFailure, Worker};

/// Limits applied to one dispatch stage
#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    /// Maximum concurrent in-flight calls
    pub max_concurrency: usize,
    /// Timeout for a single worker call
    pub per_call_timeout: Duration,
    /// Deadline shared by every call in the round
    pub round_deadline: Duration,
    /// Compression-rate cap used to validate responses
    pub max_compress_rate: f64,
}

/// Fan the challenge out to `workers` and collect one `Attempt` per
/// worker. Always returns exactly `workers.len()` attempts, sorted by
/// worker UID; partial success is the normal case.
pub async fn dispatch_round(
    miner: Arc<dyn MinerClient>,
    challenge: &str,
    workers: &[Worker],
    limits: DispatchLimits,
) -> Vec<Attempt> {
    let deadline = Instant::now() + limits.round_deadline;
    let semaphore = Arc::new(Semaphore::new(limits.max_concurrency.max(1)));
    let challenge: Arc<str> = Arc::from(challenge);

    let mut set: JoinSet<Attempt> = JoinSet::new();
    for worker in workers.iter().cloned() {
        let miner = Arc::clone(&miner);
        let semaphore = Arc::clone(&semaphore);
        let challenge = Arc::clone(&challenge);
        let limits = limits;

        set.spawn(async move {
            let started = Instant::now();

            // Waiting for a permit counts against the round deadline too.
            let _permit = match timeout_at(deadline, semaphore.acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    return Attempt::failed(
                        worker.uid,
                        AttemptFailure::Transport("dispatch pool closed".to_string()),
                        elapsed_ms(started),
                    )
                }
                Err(_) => {
                    return Attempt::failed(worker.uid, AttemptFailure::Timeout, elapsed_ms(started))
                }
            };

            let call_deadline = deadline.min(Instant::now() + limits.per_call_timeout);
            let result = timeout_at(call_deadline, miner.compress(&worker.endpoint, &challenge)).await;
            let latency_ms = elapsed_ms(started);

            match result {
                Ok(Ok(compressed)) => {
                    match validate_response(&challenge, &compressed, limits.max_compress_rate) {
                        Ok(()) => Attempt::succeeded(worker.uid, compressed, latency_ms),
                        Err(failure) => Attempt::failed(worker.uid, failure, latency_ms),
                    }
                }
                Ok(Err(err)) => Attempt::failed(
                    worker.uid,
                    AttemptFailure::Transport(err.to_string()),
                    latency_ms,
                ),
                Err(_) => Attempt::failed(worker.uid, AttemptFailure::Timeout, latency_ms),
            }
        });
    }

    let mut attempts = Vec::with_capacity(workers.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(attempt) => attempts.push(attempt),
            // A panicked dispatch task loses that worker's attempt; the
            // round still proceeds with the rest.
            Err(err) => debug!("dispatch task join error: {}", err),
        }
    }

    attempts.sort_by_key(|a| a.worker);
    attempts
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
