//! Condense Validator
//!
//! Round orchestrator for a text-compression subnet: it fetches a
//! challenge, fans it out to eligible compression workers, scores the
//! responses, folds the results into per-worker running scores, and
//! periodically commits a normalized weight vector to the chain.
//!
//! ## Module Structure
//!
//! - `config`: layered configuration with environment overrides
//! - `error`: the recoverable error taxonomy shared by every stage
//! - `types`: domain types (Worker, Round, Attempt, ScoreRecord, WeightVector)
//! - `client/`: HTTP clients for the registry, synthesis, scoring and
//!   chain sidecar services, plus the per-worker miner client
//! - `dispatch`: bounded-concurrency challenge fan-out under a round deadline
//! - `scoring`: response validation, local compression/diversity metrics,
//!   and scoring-service collection
//! - `aggregator`: composite scores, EMA smoothing and absence decay
//! - `commit`: interval-gated, epoch-idempotent weight submission
//! - `events`: structured round events (running / finished / set_weights)
//! - `validator`: the round state machine that ties the stages together

pub mod aggregator;
pub mod backoff;
pub mod client;
pub mod commit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod scoring;
pub mod types;
pub mod validator;

pub use config::ValidatorConfig;
pub use error::{Result, ValidatorError};
pub use validator::ValidatorCore;
