//! Score aggregation: composite formula, smoothing, decay, normalization.
//!
//! The `ScoreBook` is the only mutable cross-round state in the validator.
//! It is owned by the scheduler and written exactly once per completed
//! round, which is what makes the EMA safe without locks: rounds never
//! overlap.
//!
//! Composite formula per scored worker:
//! ```text
//! S = 0.7*r + 0.2*r*c + 0.1*r*d
//! ```
//! With r, c, d in [0,1], S is also in [0,1] and non-decreasing in each
//! component.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AggregationConfig;
use crate::types::{ScoreRecord, WeightVector, WorkerId};

/// Weight of the raw preference component
const W_RAW: f64 = 0.7;
/// Weight of the compression component (scaled by r)
const W_COMPRESSION: f64 = 0.2;
/// Weight of the diversity component (scaled by r)
const W_DIVERSITY: f64 = 0.1;

/// Composite score for one record.
pub fn composite(record: &ScoreRecord) -> f64 {
    W_RAW * record.raw
        + W_COMPRESSION * record.raw * record.compression
        + W_DIVERSITY * record.raw * record.diversity
}

/// Smoothed per-worker score plus absence bookkeeping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunningScore {
    pub score: f64,
    /// Consecutive completed rounds without a ScoreRecord
    pub missed_rounds: u64,
}

/// Per-worker running scores for the lifetime of the process.
#[derive(Debug)]
pub struct ScoreBook {
    config: AggregationConfig,
    entries: BTreeMap<WorkerId, RunningScore>,
    rounds_applied: u64,
}

impl ScoreBook {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            rounds_applied: 0,
        }
    }

    /// Fold one completed round into the book. Scored workers get an EMA
    /// update; known workers without a record accumulate missed rounds and,
    /// once past the grace window, decay multiplicatively per missed round.
    /// Must be called exactly once per completed round - abandoned rounds
    /// (no challenge, registry down) must not reach here.
    pub fn apply_round(&mut self, records: &[ScoreRecord]) {
        let alpha = self.config.alpha;

        for record in records {
            let s = composite(record);
            let entry = self.entries.entry(record.worker).or_insert(RunningScore {
                score: 0.0,
                missed_rounds: 0,
            });
            entry.score = alpha * s + (1.0 - alpha) * entry.score;
            entry.missed_rounds = 0;
        }

        let scored: Vec<WorkerId> = records.iter().map(|r| r.worker).collect();
        for (worker, entry) in self.entries.iter_mut() {
            if scored.contains(worker) {
                continue;
            }
            entry.missed_rounds += 1;
            if entry.missed_rounds > self.config.absence_grace_rounds {
                entry.score *= self.config.decay;
                debug!(
                    worker = *worker,
                    missed = entry.missed_rounds,
                    score = entry.score,
                    "decayed absent worker"
                );
            }
        }

        self.rounds_applied += 1;
    }

    /// Normalized weight snapshot, or `None` when no worker has a positive
    /// running score (in which case no commit is issued).
    pub fn weight_vector(&self) -> Option<WeightVector> {
        let scores: BTreeMap<WorkerId, f64> = self
            .entries
            .iter()
            .map(|(worker, entry)| (*worker, entry.score))
            .collect();
        WeightVector::normalize(&scores)
    }

    pub fn get(&self, worker: WorkerId) -> Option<RunningScore> {
        self.entries.get(&worker).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rounds_applied(&self) -> u64 {
        self.rounds_applied
    }
}
