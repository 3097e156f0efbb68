//! Structured round events.
//!
//! The validator's only observability obligation is three event classes -
//! `running` while a round is in flight, `finished` when it closes, and
//! `set_weights` when a vector is submitted - with enough fields to
//! reconstruct round history from logs. Events go out through `tracing`
//! and are kept in a bounded in-memory ring for inspection, the way the
//! original forward log kept its last few columns.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::WorkerId;

/// Default number of retained events
const DEFAULT_CAPACITY: usize = 256;

/// Stage of the round pipeline an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fetching,
    Dispatching,
    Scoring,
    Aggregating,
    Committing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetching => write!(f, "fetching"),
            Stage::Dispatching => write!(f, "dispatching"),
            Stage::Scoring => write!(f, "scoring"),
            Stage::Aggregating => write!(f, "aggregating"),
            Stage::Committing => write!(f, "committing"),
        }
    }
}

/// One of the three emitted event classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventClass {
    Running,
    Finished,
    SetWeights,
}

impl EventClass {
    fn tag(&self) -> &'static str {
        match self {
            EventClass::Running => "running",
            EventClass::Finished => "finished",
            EventClass::SetWeights => "set_weights",
        }
    }
}

/// A single structured event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEvent {
    pub class: EventClass,
    pub round_id: String,
    pub round_seq: u64,
    pub stage: Option<Stage>,
    pub worker: Option<WorkerId>,
    pub outcome: String,
    pub at: DateTime<Utc>,
}

/// Bounded event history plus tracing emission
pub struct EventLog {
    history: RwLock<VecDeque<RoundEvent>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// A round (or one of its stages) is in flight.
    pub fn running(&self, round_id: &str, round_seq: u64, stage: Stage, outcome: &str) {
        self.record(RoundEvent {
            class: EventClass::Running,
            round_id: round_id.to_string(),
            round_seq,
            stage: Some(stage),
            worker: None,
            outcome: outcome.to_string(),
            at: Utc::now(),
        });
    }

    /// Per-worker outcome within a running round.
    pub fn worker_outcome(
        &self,
        round_id: &str,
        round_seq: u64,
        stage: Stage,
        worker: WorkerId,
        outcome: &str,
    ) {
        self.record(RoundEvent {
            class: EventClass::Running,
            round_id: round_id.to_string(),
            round_seq,
            stage: Some(stage),
            worker: Some(worker),
            outcome: outcome.to_string(),
            at: Utc::now(),
        });
    }

    /// A round closed (successfully, empty, or abandoned).
    pub fn finished(&self, round_id: &str, round_seq: u64, outcome: &str) {
        self.record(RoundEvent {
            class: EventClass::Finished,
            round_id: round_id.to_string(),
            round_seq,
            stage: None,
            worker: None,
            outcome: outcome.to_string(),
            at: Utc::now(),
        });
    }

    /// A weight vector was submitted (or a submission cycle resolved).
    pub fn set_weights(&self, round_id: &str, round_seq: u64, outcome: &str) {
        self.record(RoundEvent {
            class: EventClass::SetWeights,
            round_id: round_id.to_string(),
            round_seq,
            stage: Some(Stage::Committing),
            worker: None,
            outcome: outcome.to_string(),
            at: Utc::now(),
        });
    }

    fn record(&self, event: RoundEvent) {
        info!(
            event = event.class.tag(),
            round_id = %event.round_id,
            round_seq = event.round_seq,
            stage = event.stage.map(|s| s.to_string()).unwrap_or_default(),
            worker = event.worker.map(|w| w.to_string()).unwrap_or_default(),
            outcome = %event.outcome,
            "round event"
        );

        let mut history = self.history.write();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<RoundEvent> {
        let history = self.history.read();
        history
            .iter()
            .skip(history.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    /// Events belonging to one round.
    pub fn for_round(&self, round_id: &str) -> Vec<RoundEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.round_id == round_id)
            .cloned()
            .collect()
    }
}
