//! Score collection and local text metrics.
//!
//! The scoring service owns the preference model; the validator computes
//! compression ratio and diversity locally (word-level, matching what the
//! scoring model is asked to judge) and uses them whenever the service
//! reply omits its own estimates. Replies with any component outside
//! `[0,1]` are rejected, never clamped.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::client::ScoringService;
use crate::error::ValidatorError;
use crate::types::{Attempt, AttemptFailure, Round, ScoreRecord, WorkerId};

/// Validate a worker's compressed response before it becomes a successful
/// attempt. Empty responses and responses compressed beyond `max_rate`
/// (degenerate near-empty output) are rejected.
pub fn validate_response(
    original: &str,
    compressed: &str,
    max_rate: f64,
) -> Result<(), AttemptFailure> {
    if compressed.trim().is_empty() {
        return Err(AttemptFailure::EmptyResponse);
    }
    let rate = compression_ratio(original, compressed);
    if rate > max_rate {
        return Err(AttemptFailure::CompressRateExceeded { rate });
    }
    Ok(())
}

/// Word-count compression ratio in `[0,1]`: 0 when the response is no
/// shorter than the original, approaching 1 as it shrinks toward nothing.
pub fn compression_ratio(original: &str, compressed: &str) -> f64 {
    let original_words = extract_words(original).len();
    if original_words == 0 {
        return 0.0;
    }
    let compressed_words = extract_words(compressed).len();
    (1.0 - compressed_words as f64 / original_words as f64).max(0.0)
}

/// Lowercased alphanumeric word tokens.
pub fn extract_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Word-level edit distance (insert, delete, substitute whole words).
pub fn word_edit_distance(a: &str, b: &str) -> usize {
    let words_a = extract_words(a);
    let words_b = extract_words(b);
    let (m, n) = (words_a.len(), words_b.len());

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut current = vec![0usize; n + 1];

    for i in 1..=m {
        current[0] = i;
        for j in 1..=n {
            current[j] = if words_a[i - 1] == words_b[j - 1] {
                prev[j - 1]
            } else {
                1 + prev[j - 1].min(prev[j]).min(current[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[n]
}

/// Similarity in `[0,1]` from word edit distance; 1 means identical.
pub fn word_edit_similarity(a: &str, b: &str) -> f64 {
    let max_len = extract_words(a).len().max(extract_words(b).len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - word_edit_distance(a, b) as f64 / max_len as f64
}

/// Per-text diversity scores: each text's average difference from every
/// other text in the batch. A lone text scores 1.0.
pub fn diversity_scores(texts: &[&str]) -> Vec<f64> {
    let n = texts.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }

    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let total_diff: f64 = texts
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, other)| 1.0 - word_edit_similarity(text, other))
                .sum();
            total_diff / (n - 1) as f64
        })
        .collect()
}

/// Outcome of the score-collection stage for one round.
#[derive(Debug, Default)]
pub struct ScoredRound {
    pub records: Vec<ScoreRecord>,
    /// Workers excluded with the reason, for logging
    pub excluded: Vec<(WorkerId, ValidatorError)>,
}

/// Submit every successful attempt to the scoring service with bounded
/// concurrency. A failed or out-of-range reply excludes that worker's
/// record without aborting the stage.
pub async fn collect_scores(
    scoring: Arc<dyn ScoringService>,
    round: &Round,
    max_concurrency: usize,
) -> ScoredRound {
    let attempts: Vec<&Attempt> = round.successful_attempts().collect();
    if attempts.is_empty() {
        return ScoredRound::default();
    }

    let texts: Vec<&str> = attempts
        .iter()
        .map(|a| a.compressed.as_deref().unwrap_or_default())
        .collect();
    let local_diversity = diversity_scores(&texts);

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let calls = attempts.iter().zip(texts.iter()).map(|(attempt, text)| {
        let scoring = Arc::clone(&scoring);
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some((attempt.worker, scoring.score(&round.challenge, text).await))
        }
    });
    let replies = join_all(calls).await;

    let mut scored = ScoredRound::default();
    for (idx, reply) in replies.into_iter().enumerate() {
        let Some((worker, result)) = reply else {
            continue;
        };
        let text = texts[idx];
        match result {
            Ok(raw) => {
                let compression = raw
                    .c
                    .unwrap_or_else(|| compression_ratio(&round.challenge, text));
                let diversity = raw.d.unwrap_or(local_diversity[idx]);
                match ScoreRecord::new(worker, raw.r, compression, diversity) {
                    Ok(record) => scored.records.push(record),
                    Err(err) => scored.excluded.push((worker, err)),
                }
            }
            Err(err) => scored.excluded.push((worker, err)),
        }
    }

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RawScore;
    use crate::error::{Result, Service};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_extract_words() {
        assert_eq!(
            extract_words("Hello, World! 42"),
            vec!["hello", "world", "42"]
        );
        assert!(extract_words("...").is_empty());
    }

    #[test]
    fn test_word_edit_distance() {
        assert_eq!(word_edit_distance("a b c", "a b c"), 0);
        assert_eq!(word_edit_distance("a b c", "a x c"), 1);
        assert_eq!(word_edit_distance("a b", "a b c d"), 2);
        assert_eq!(word_edit_distance("", "a b"), 2);
    }

    #[test]
    fn test_word_edit_similarity_bounds() {
        assert_eq!(word_edit_similarity("same text", "same text"), 1.0);
        assert_eq!(word_edit_similarity("", ""), 1.0);
        assert_eq!(word_edit_similarity("one two", "three four"), 0.0);
    }

    #[test]
    fn test_diversity_scores() {
        assert_eq!(diversity_scores(&["only"]), vec![1.0]);

        let scores = diversity_scores(&["a b c", "a b c", "x y z"]);
        // The two identical texts are less diverse than the distinct one
        assert!(scores[0] < scores[2]);
        assert_eq!(scores[0], scores[1]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_compression_ratio() {
        let original = "one two three four five six seven eight";
        assert_eq!(compression_ratio(original, original), 0.0);
        assert_eq!(compression_ratio(original, "one two three four"), 0.5);
        // Longer than the original earns no compression credit
        assert_eq!(compression_ratio("one two", "one two three four"), 0.0);
        assert_eq!(compression_ratio("", "anything"), 0.0);
    }

    #[test]
    fn test_validate_response() {
        let original = "one two three four five six seven eight nine ten";
        assert!(validate_response(original, "one two three four five", 0.8).is_ok());
        assert_eq!(
            validate_response(original, "   ", 0.8),
            Err(AttemptFailure::EmptyResponse)
        );
        match validate_response(original, "one", 0.8) {
            Err(AttemptFailure::CompressRateExceeded { rate }) => {
                assert!((rate - 0.9).abs() < 1e-9)
            }
            other => panic!("expected compress rate failure, got {other:?}"),
        }
    }

    /// Scoring double with fixed per-worker replies keyed by compressed text.
    struct FixedScoring {
        replies: HashMap<String, Result<RawScore>>,
    }

    #[async_trait]
    impl ScoringService for FixedScoring {
        async fn score(&self, _original: &str, compressed: &str) -> Result<RawScore> {
            match self.replies.get(compressed) {
                Some(Ok(score)) => Ok(*score),
                Some(Err(_)) => Err(ValidatorError::unavailable(Service::Scoring, "down")),
                None => Ok(RawScore {
                    r: 0.5,
                    c: None,
                    d: None,
                }),
            }
        }
    }

    fn round_with_attempts(attempts: Vec<Attempt>) -> Round {
        let mut round = Round::new(1, "one two three four five six seven eight".to_string());
        round.attempts = attempts;
        round
    }

    #[tokio::test]
    async fn test_collect_scores_fills_local_metrics() {
        let scoring = Arc::new(FixedScoring {
            replies: HashMap::from([(
                "one two three four".to_string(),
                Ok(RawScore {
                    r: 0.8,
                    c: None,
                    d: None,
                }),
            )]),
        });

        let round = round_with_attempts(vec![Attempt::succeeded(
            3,
            "one two three four".to_string(),
            100,
        )]);

        let scored = collect_scores(scoring, &round, 4).await;
        assert_eq!(scored.records.len(), 1);
        let record = scored.records[0];
        assert_eq!(record.worker, 3);
        assert_eq!(record.raw, 0.8);
        assert_eq!(record.compression, 0.5); // computed locally: 4 of 8 words
        assert_eq!(record.diversity, 1.0); // lone response
    }

    #[tokio::test]
    async fn test_collect_scores_excludes_out_of_range() {
        let scoring = Arc::new(FixedScoring {
            replies: HashMap::from([
                (
                    "one two".to_string(),
                    Ok(RawScore {
                        r: 1.4, // invalid
                        c: Some(0.5),
                        d: Some(0.5),
                    }),
                ),
                (
                    "three four".to_string(),
                    Ok(RawScore {
                        r: 0.6,
                        c: Some(0.4),
                        d: Some(0.3),
                    }),
                ),
            ]),
        });

        let round = round_with_attempts(vec![
            Attempt::succeeded(1, "one two".to_string(), 50),
            Attempt::succeeded(2, "three four".to_string(), 60),
        ]);

        let scored = collect_scores(scoring, &round, 4).await;
        assert_eq!(scored.records.len(), 1);
        assert_eq!(scored.records[0].worker, 2);
        assert_eq!(scored.excluded.len(), 1);
        assert_eq!(scored.excluded[0].0, 1);
        assert!(matches!(
            scored.excluded[0].1,
            ValidatorError::InvalidScoreRange { .. }
        ));
    }

    #[tokio::test]
    async fn test_collect_scores_service_failure_excludes_only_that_worker() {
        let scoring = Arc::new(FixedScoring {
            replies: HashMap::from([(
                "one two".to_string(),
                Err(ValidatorError::unavailable(Service::Scoring, "down")),
            )]),
        });

        let round = round_with_attempts(vec![
            Attempt::succeeded(1, "one two".to_string(), 50),
            Attempt::succeeded(2, "three four five".to_string(), 60),
        ]);

        let scored = collect_scores(scoring, &round, 4).await;
        assert_eq!(scored.records.len(), 1);
        assert_eq!(scored.records[0].worker, 2);
        assert_eq!(scored.excluded.len(), 1);
    }

    /// Scoring double that tracks peak in-flight calls.
    struct SlowScoring {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ScoringService for SlowScoring {
        async fn score(&self, _original: &str, _compressed: &str) -> Result<RawScore> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RawScore {
                r: 0.5,
                c: Some(0.5),
                d: Some(0.5),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoring_concurrency_is_bounded() {
        let scoring = Arc::new(SlowScoring {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let attempts = (1..=6u16)
            .map(|uid| Attempt::succeeded(uid, format!("reply {uid}"), 50))
            .collect();
        let round = round_with_attempts(attempts);

        let scored = collect_scores(Arc::clone(&scoring) as Arc<dyn ScoringService>, &round, 2)
            .await;

        assert_eq!(scored.records.len(), 6);
        assert!(scoring.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_collect_scores_empty_round() {
        let scoring = Arc::new(FixedScoring {
            replies: HashMap::new(),
        });
        let round = round_with_attempts(vec![Attempt::failed(
            1,
            AttemptFailure::Timeout,
            2000,
        )]);

        let scored = collect_scores(scoring, &round, 4).await;
        assert!(scored.records.is_empty());
        assert!(scored.excluded.is_empty());
    }
}
