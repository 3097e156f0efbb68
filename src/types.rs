//! Core domain types for the validator round loop.
//!
//! A `Round` owns one challenge and the per-worker `Attempt`s it produced.
//! `ScoreRecord`s are derived from successful attempts plus the scoring
//! service reply, and feed the aggregator. A `WeightVector` is the
//! normalized snapshot submitted to the chain sidecar.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ValidatorError};

/// Stable numeric identity of a miner on the subnet (its UID).
pub type WorkerId = u16;

/// A miner eligible for evaluation this round, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Subnet UID, `id` on the registry wire
    #[serde(rename = "id")]
    pub uid: WorkerId,
    /// HTTP endpoint the challenge is dispatched to
    pub endpoint: String,
}

/// Why a per-worker dispatch produced no usable compressed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttemptFailure {
    /// The worker did not answer before the per-call or round deadline
    Timeout,
    /// Transport-level failure talking to the worker
    Transport(String),
    /// The worker answered with an empty compressed text
    EmptyResponse,
    /// Compression rate above the configured cap (suspiciously aggressive)
    CompressRateExceeded { rate: f64 },
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Timeout => write!(f, "timeout"),
            AttemptFailure::Transport(reason) => write!(f, "transport: {}", reason),
            AttemptFailure::EmptyResponse => write!(f, "empty_response"),
            AttemptFailure::CompressRateExceeded { rate } => {
                write!(f, "compress_rate_exceeded: {:.3}", rate)
            }
        }
    }
}

/// Outcome of dispatching the challenge to one worker. Immutable once
/// recorded; owned exclusively by its `Round`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub worker: WorkerId,
    /// Compressed response text, present only on success
    pub compressed: Option<String>,
    /// Wall time of the dispatch call
    pub latency_ms: u64,
    pub failure: Option<AttemptFailure>,
}

impl Attempt {
    pub fn succeeded(worker: WorkerId, compressed: String, latency_ms: u64) -> Self {
        Self {
            worker,
            compressed: Some(compressed),
            latency_ms,
            failure: None,
        }
    }

    pub fn failed(worker: WorkerId, failure: AttemptFailure, latency_ms: u64) -> Self {
        Self {
            worker,
            compressed: None,
            latency_ms,
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.compressed.is_some()
    }
}

/// One evaluation cycle: challenge text plus every worker's attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// Short unique id used to correlate log events
    pub id: String,
    /// Monotonic sequence number within this process
    pub seq: u64,
    /// Original text sent to every worker
    pub challenge: String,
    pub started_at: DateTime<Utc>,
    pub attempts: Vec<Attempt>,
}

impl Round {
    pub fn new(seq: u64, challenge: String) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), seq, challenge)
    }

    /// Build a round under an id allocated before the challenge was
    /// fetched, so fetch-stage events correlate with the round.
    pub fn with_id(id: String, seq: u64, challenge: String) -> Self {
        Self {
            id,
            seq,
            challenge,
            started_at: Utc::now(),
            attempts: Vec::new(),
        }
    }

    /// Attempts that produced a compressed response.
    pub fn successful_attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter().filter(|a| a.is_success())
    }
}

/// Per-worker-per-round score tuple. All three components are validated
/// into `[0,1]` at construction; out-of-range values are rejected, never
/// clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub worker: WorkerId,
    /// Raw preference score from the scoring model
    pub raw: f64,
    /// Compression ratio (1 = compressed to nothing, 0 = no compression)
    pub compression: f64,
    /// Diversity against the other responses in the round
    pub diversity: f64,
}

impl ScoreRecord {
    pub fn new(worker: WorkerId, raw: f64, compression: f64, diversity: f64) -> Result<Self> {
        for (field, value) in [
            ("raw", raw),
            ("compression", compression),
            ("diversity", diversity),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ValidatorError::InvalidScoreRange {
                    worker,
                    field,
                    value,
                });
            }
        }
        Ok(Self {
            worker,
            raw,
            compression,
            diversity,
        })
    }
}

/// Normalized weight distribution over workers, entries summing to 1.
/// Immutable snapshot; superseded by the next commit, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<WorkerId, f64>,
}

impl WeightVector {
    /// Normalize non-negative scores into a weight vector. Returns `None`
    /// when every score is zero, in which case no commit must be issued.
    pub fn normalize(scores: &BTreeMap<WorkerId, f64>) -> Option<Self> {
        let total: f64 = scores.values().filter(|s| **s > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let weights = scores
            .iter()
            .filter(|(_, s)| **s > 0.0)
            .map(|(uid, s)| (*uid, s / total))
            .collect();
        Some(Self { weights })
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, f64)> + '_ {
        self.weights.iter().map(|(uid, w)| (*uid, *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, worker: WorkerId) -> Option<f64> {
        self.weights.get(&worker).copied()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}
