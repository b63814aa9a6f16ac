//! Derived score rows, owned by the core.
//!
//! These are the only rows the core persists: one `ConstructScore` per
//! (submission, construct scale) and one `CompositeScore` per
//! (submission, composite scale), upserted by the score computer and
//! destroyed with their submission.

use crate::domain::{CompositeScaleId, ConstructScaleId, SubmissionId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructScore {
    pub submission_id: SubmissionId,
    pub construct_id: ConstructScaleId,
    /// Null when fewer numeric items were answered than the construct's
    /// minimum, or when evaluation faulted.
    pub score: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub submission_id: SubmissionId,
    pub composite_id: CompositeScaleId,
    pub score: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

/// Owner of the derived rows, keyed by their unique constraints.
#[derive(Debug, Default)]
pub struct ScoreStore {
    construct_scores: DashMap<(SubmissionId, ConstructScaleId), ConstructScore>,
    composite_scores: DashMap<(SubmissionId, CompositeScaleId), CompositeScore>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_construct_score(&self, row: ConstructScore) {
        self.construct_scores
            .insert((row.submission_id, row.construct_id), row);
    }

    pub fn upsert_composite_score(&self, row: CompositeScore) {
        self.composite_scores
            .insert((row.submission_id, row.composite_id), row);
    }

    pub fn construct_score(
        &self,
        submission_id: SubmissionId,
        construct_id: ConstructScaleId,
    ) -> Option<ConstructScore> {
        self.construct_scores
            .get(&(submission_id, construct_id))
            .map(|entry| entry.value().clone())
    }

    pub fn composite_score(
        &self,
        submission_id: SubmissionId,
        composite_id: CompositeScaleId,
    ) -> Option<CompositeScore> {
        self.composite_scores
            .get(&(submission_id, composite_id))
            .map(|entry| entry.value().clone())
    }

    /// All construct rows of one submission.
    pub fn construct_scores_for_submission(
        &self,
        submission_id: SubmissionId,
    ) -> Vec<ConstructScore> {
        let mut out: Vec<ConstructScore> = self
            .construct_scores
            .iter()
            .filter(|entry| entry.key().0 == submission_id)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|row| row.construct_id);
        out
    }

    pub fn composite_scores_for_submission(
        &self,
        submission_id: SubmissionId,
    ) -> Vec<CompositeScore> {
        let mut out: Vec<CompositeScore> = self
            .composite_scores
            .iter()
            .filter(|entry| entry.key().0 == submission_id)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|row| row.composite_id);
        out
    }

    /// Drop every derived row of a destroyed submission.
    pub fn remove_submission(&self, submission_id: SubmissionId) {
        self.construct_scores
            .retain(|key, _| key.0 != submission_id);
        self.composite_scores
            .retain(|key, _| key.0 != submission_id);
    }
}
