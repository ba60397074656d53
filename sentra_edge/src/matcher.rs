//! Sentra Edge - Similarity Matcher
//!
//! Answers "who is this" against a snapshot of the embedding store: cosine
//! similarity against every stored vector, maximum wins if it clears the
//! acceptance threshold. A linear scan is plenty at the tens-to-hundreds
//! scale this store holds.

use crate::store::EmbeddingRecord;

/// Result of a matcher query. Always definite: a match or not a match.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Match {
        asset_id: String,
        label: Option<String>,
        score: f32,
    },
    NoMatch {
        /// Best score seen, for reporting (below threshold)
        best: Option<(String, f32)>,
    },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Match { .. })
    }
}

/// Threshold matcher over a fixed record snapshot.
pub struct Matcher {
    records: Vec<EmbeddingRecord>,
    threshold: f32,
}

impl Matcher {
    /// Records must be in store scan order (oldest first); on a score tie
    /// the earliest record wins, and only a strictly greater score
    /// displaces the current best.
    pub fn new(records: Vec<EmbeddingRecord>, threshold: f32) -> Self {
        Self { records, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match a probe vector against the snapshot.
    pub fn query(&self, probe: &[f32]) -> MatchOutcome {
        let mut best: Option<(&EmbeddingRecord, f32)> = None;

        for record in &self.records {
            let score = cosine_similarity(probe, &record.vector);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((record, score)),
            }
        }

        match best {
            Some((record, score)) if score >= self.threshold => MatchOutcome::Match {
                asset_id: record.asset_id.clone(),
                label: record.label.clone(),
                score,
            },
            Some((record, score)) => MatchOutcome::NoMatch {
                best: Some((record.asset_id.clone(), score)),
            },
            None => MatchOutcome::NoMatch { best: None },
        }
    }
}

/// Cosine similarity in [-1, 1]. Mismatched or empty vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
