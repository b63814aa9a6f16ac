//! Score computer.
//!
//! Runs on every new or modified submission: evaluates each applicable
//! construct equation over typed responses, applies the minimum-items
//! override, then recomputes affected composites. Constructs are always
//! written before the composites that depend on them, and the whole
//! recomputation is idempotent under retry.

use crate::domain::{
    classify_response, Combiner, CompositeConstructScale, ConstructScale, Item, LikertScale,
    SubmissionId,
};
use crate::equation::{CompileError, Equation, Value};
use crate::scores::{CompositeScore, ConstructScore, ScoreStore};
use crate::store::{ResponseStore, StoreError};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub struct ScoreComputer {
    store: Arc<dyn ResponseStore>,
    scores: Arc<ScoreStore>,
    /// Equations compile once per construct and are reused across
    /// submissions.
    compiled: DashMap<crate::domain::ConstructScaleId, Equation>,
}

impl ScoreComputer {
    pub fn new(store: Arc<dyn ResponseStore>, scores: Arc<ScoreStore>) -> Self {
        Self {
            store,
            scores,
            compiled: DashMap::new(),
        }
    }

    /// Recompute every derived row of one submission.
    pub fn recompute_submission(&self, submission_id: SubmissionId) -> Result<(), StoreError> {
        let submission = self.store.get_submission(submission_id)?;
        let pq = self
            .store
            .get_patient_questionnaire(submission.patient_questionnaire_id)?;
        let scales = self
            .store
            .list_scales_for_questionnaire(pq.questionnaire_id)?;
        if scales.is_empty() {
            return Ok(());
        }

        let responses: HashMap<_, _> = self
            .store
            .list_responses(submission_id)?
            .into_iter()
            .map(|(item, raw)| (item.id, raw))
            .collect();

        for scale in &scales {
            let score = self.construct_score(scale, &responses)?;
            self.scores.upsert_construct_score(ConstructScore {
                submission_id,
                construct_id: scale.id,
                score,
                computed_at: Utc::now(),
            });
        }

        let scale_ids: Vec<_> = scales.iter().map(|s| s.id).collect();
        for composite in self.store.list_composites_for_scales(&scale_ids)? {
            let score = self.composite_score(&composite, submission_id);
            self.scores.upsert_composite_score(CompositeScore {
                submission_id,
                composite_id: composite.id,
                score,
                computed_at: Utc::now(),
            });
        }

        Ok(())
    }

    /// Drop derived rows when a submission is destroyed.
    pub fn on_submission_removed(&self, submission_id: SubmissionId) {
        self.scores.remove_submission(submission_id);
    }

    /// Evaluate one construct over the submission's responses.
    ///
    /// Evaluation faults reduce to a null score with an observability
    /// event; they never fail the request.
    fn construct_score(
        &self,
        scale: &ConstructScale,
        responses: &HashMap<crate::domain::ItemId, String>,
    ) -> Result<Option<f64>, StoreError> {
        let items = self.store.list_items_for_construct(scale.id)?;

        let mut inputs: HashMap<u32, Value> = HashMap::new();
        let mut answered_numeric = 0u32;
        for item in &items {
            let Some(number) = item.item_number else {
                continue;
            };
            let likert = self.likert_scale_of(item)?;
            let raw = responses.get(&item.id).map(String::as_str);
            let value = classify_response(item, likert.as_ref(), raw);
            if matches!(value, Value::Number(_)) {
                answered_numeric += 1;
            }
            inputs.insert(number, value);
        }

        if answered_numeric < scale.minimum_number_of_items {
            return Ok(None);
        }

        let equation = match self.compiled_equation(scale, &items) {
            Ok(equation) => equation,
            Err(err) => {
                // Registration should have rejected this equation; an
                // unusable definition yields null rather than a failure.
                warn!(construct = %scale.id, error = %err, "construct equation failed to compile");
                return Ok(None);
            }
        };

        match equation.evaluate(&inputs) {
            Ok(Value::Number(score)) if score.is_finite() => Ok(Some(score)),
            Ok(Value::Null) => Ok(None),
            Ok(other) => {
                warn!(
                    construct = %scale.id,
                    result = other.type_name(),
                    "equation produced a non-numeric result"
                );
                Ok(None)
            }
            Err(err) => {
                warn!(construct = %scale.id, error = %err, "equation evaluation failed");
                Ok(None)
            }
        }
    }

    fn likert_scale_of(&self, item: &Item) -> Result<Option<LikertScale>, StoreError> {
        match item.likert_scale_id {
            Some(id) => Ok(Some(self.store.get_likert_scale(id)?)),
            None => Ok(None),
        }
    }

    fn compiled_equation(
        &self,
        scale: &ConstructScale,
        items: &[Item],
    ) -> Result<Equation, CompileError> {
        if let Some(cached) = self.compiled.get(&scale.id) {
            if cached.source() == scale.equation {
                return Ok(cached.clone());
            }
        }
        let allowed = items.iter().filter_map(|i| i.item_number).collect();
        let equation = Equation::compile(&scale.equation, &allowed)?;
        self.compiled.insert(scale.id, equation.clone());
        Ok(equation)
    }

    /// Fold the member construct scores of one submission. Null members
    /// drop out; the composite is null only when every member is null.
    fn composite_score(
        &self,
        composite: &CompositeConstructScale,
        submission_id: SubmissionId,
    ) -> Option<f64> {
        let values: Vec<f64> = composite
            .construct_ids
            .iter()
            .filter_map(|cid| self.scores.construct_score(submission_id, *cid))
            .filter_map(|row| row.score)
            .collect();
        combine(composite.combiner, &values)
    }
}

/// Apply a combiner over non-null member scores.
pub fn combine(combiner: Combiner, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match combiner {
        Combiner::Sum => Some(values.iter().sum()),
        Combiner::Product => Some(values.iter().product()),
        Combiner::Mean => crate::stats::mean(values),
        Combiner::Median => crate::stats::median(values),
        Combiner::Mode => Some(mode(values)),
        Combiner::Min => values.iter().copied().reduce(f64::min),
        Combiner::Max => values.iter().copied().reduce(f64::max),
    }
}

/// Most frequent value; ties resolve to the smallest candidate.
fn mode(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite score in mode input"));

    let mut best = sorted[0];
    let mut best_count = 0usize;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best = sorted[i];
        }
        i = j;
    }
    best
}
