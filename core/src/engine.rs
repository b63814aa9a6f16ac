//! Computation API of the analytics core.
//!
//! [`AnalyticsEngine`] binds the store, the score computer, the cohort
//! aggregator and the cache layer behind three operations: patient
//! review, cohort aggregate, and the submission-written invalidation
//! hook. Reads run concurrently across patients; writes take a
//! per-patient lock for recomputation plus invalidation.

use crate::cache::{key, Cache, CacheLayer};
use crate::cohort::{
    resolve_anchor, AggregateError, AggregateTarget, AggregationKind, BucketStat, CohortAggregator,
};
use crate::config::CoreConfig;
use crate::domain::{
    classify_response, CompositeConstructScale, CompositeScaleId, ConstructScale,
    ConstructScaleId, Gender, InstitutionId, Item, ItemId, LikertScale, PatientId,
    QuestionnaireId, QuestionnaireSubmission, ResponseType, SubmissionId,
};
use crate::equation::Value;
use crate::interpret::{interpret, Interpretation};
use crate::intervals::{bucket_index, window, FilterContext};
use crate::scores::ScoreStore;
use crate::scoring::ScoreComputer;
use crate::store::{CohortPredicates, ResponseStore, StoreError, StoreReason};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Deadlines
// ============================================================================

/// Soft deadline for read operations. Writes are never cancelled once
/// recomputation begins.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn within(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn expired(&self) -> bool {
        self.0.map(|t| Instant::now() >= t).unwrap_or(false)
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|t| t.saturating_duration_since(Instant::now()))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("cross-institution access denied")]
    Unauthorized,

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] crate::equation::CompileError),

    #[error("cohort is empty after filters")]
    InsufficientCohort,

    #[error("patient lacks the requested anchor date")]
    NoAnchor,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err.reason {
            StoreReason::NotFound => CoreError::NotFound(err.detail),
            StoreReason::Unavailable => CoreError::Unavailable(err.detail),
        }
    }
}

// ============================================================================
// Review result types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub patient_id: PatientId,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub registration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireOverview {
    pub questionnaire_id: QuestionnaireId,
    pub name: String,
    pub submission_count: usize,
    pub last_submission_at: Option<DateTime<Utc>>,
}

/// One point of a bucket-indexed series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub t: i64,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructResult {
    pub construct_id: ConstructScaleId,
    pub name: String,
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub series: Vec<SeriesPoint>,
    pub interpretation: Interpretation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeResult {
    pub composite_id: CompositeScaleId,
    pub name: String,
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub series: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: ItemId,
    pub name: String,
    pub response_type: ResponseType,
    pub current: Option<f64>,
    pub previous: Option<f64>,
    /// Latest raw value for text items; numeric items leave this empty.
    pub latest_text: Option<String>,
    pub series: Vec<SeriesPoint>,
    pub interpretation: Interpretation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientReview {
    pub patient_summary: PatientSummary,
    pub questionnaires_overview: Vec<QuestionnaireOverview>,
    pub construct_scores: Vec<ConstructResult>,
    pub composite_scores: Vec<CompositeResult>,
    pub items: Vec<ItemResult>,
    /// Set when the requested anchor is missing: bucket-dependent
    /// series are empty, classifications still run on latest scores.
    pub no_anchor: bool,
}

/// Topline ordering: significant on both axes first, then other
/// significant constructs, then the rest; alphabetical within groups.
pub fn sort_topline(results: &mut [ConstructResult]) {
    results.sort_by(|a, b| {
        let rank = |r: &ConstructResult| {
            if r.interpretation.both_axes() {
                0u8
            } else if r.interpretation.current_significant || r.interpretation.change_significant {
                1
            } else {
                2
            }
        };
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
}

// ============================================================================
// Engine
// ============================================================================

pub struct AnalyticsEngine {
    store: Arc<dyn ResponseStore>,
    scores: Arc<ScoreStore>,
    computer: ScoreComputer,
    aggregator: CohortAggregator,
    cache: CacheLayer,
    config: CoreConfig,
    write_locks: DashMap<PatientId, Arc<Mutex<()>>>,
}

impl AnalyticsEngine {
    pub fn new(
        store: Arc<dyn ResponseStore>,
        cache_backend: Arc<dyn Cache>,
        config: CoreConfig,
    ) -> Self {
        let scores = Arc::new(ScoreStore::new());
        Self {
            computer: ScoreComputer::new(Arc::clone(&store), Arc::clone(&scores)),
            aggregator: CohortAggregator::new(Arc::clone(&store), Arc::clone(&scores)),
            cache: CacheLayer::new(cache_backend),
            store,
            scores,
            config,
            write_locks: DashMap::new(),
        }
    }

    /// Derived rows owned by this engine (test and inspection access).
    pub fn scores(&self) -> &ScoreStore {
        &self.scores
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Invalidation hook for the write path, invoked after a submission
    /// commit. Recomputes that submission's derived rows, then flushes
    /// the patient's cache namespace and the population namespace.
    /// Idempotent.
    pub fn on_submission_written(&self, submission_id: SubmissionId) -> Result<(), CoreError> {
        let submission = self.store.get_submission(submission_id)?;
        let lock = self.patient_write_lock(submission.patient_id);
        let _guard = lock.lock().expect("patient write lock poisoned");

        self.computer.recompute_submission(submission_id)?;
        self.cache.invalidate_patient(submission.patient_id);
        self.cache.invalidate_population();
        debug!(submission = %submission_id, patient = %submission.patient_id, "submission scored");
        Ok(())
    }

    /// Companion hook for submission destruction: derived rows go away
    /// with the submission.
    pub fn on_submission_destroyed(&self, submission_id: SubmissionId, patient_id: PatientId) {
        let lock = self.patient_write_lock(patient_id);
        let _guard = lock.lock().expect("patient write lock poisoned");

        self.computer.on_submission_removed(submission_id);
        self.cache.invalidate_patient(patient_id);
        self.cache.invalidate_population();
    }

    fn patient_write_lock(&self, patient_id: PatientId) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(patient_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Full review for one patient under a filter context.
    pub fn get_patient_review(
        &self,
        caller: InstitutionId,
        patient_id: PatientId,
        ctx: &FilterContext,
        deadline: Deadline,
    ) -> Result<PatientReview, CoreError> {
        let patient = self.store.get_patient(patient_id)?;
        if patient.institution_id != caller {
            return Err(CoreError::Unauthorized);
        }

        let anchor = resolve_anchor(self.store.as_ref(), &patient, ctx)?;
        let no_anchor = anchor.is_none();

        // Without an anchor there is no window: classifications still
        // run over the latest available scores.
        let date_window = anchor.map(|a| window(a, ctx));
        let mut submissions = self
            .store
            .list_submissions(patient_id, date_window.as_ref())?;
        if let Some(filter) = &ctx.questionnaire_filter {
            let mut kept = Vec::with_capacity(submissions.len());
            for submission in submissions {
                let pq = self
                    .store
                    .get_patient_questionnaire(submission.patient_questionnaire_id)?;
                if filter.contains(&pq.questionnaire_id) {
                    kept.push(submission);
                }
            }
            submissions = kept;
        }

        let questionnaires_overview = self.questionnaires_overview(patient_id)?;

        let questionnaire_ids: Vec<QuestionnaireId> = {
            let mut ids: Vec<QuestionnaireId> = self
                .store
                .list_patient_questionnaires(patient_id)?
                .into_iter()
                .filter(|pq| pq.display)
                .map(|pq| pq.questionnaire_id)
                .filter(|qid| {
                    ctx.questionnaire_filter
                        .as_ref()
                        .map(|f| f.contains(qid))
                        .unwrap_or(true)
                })
                .collect();
            ids.sort();
            ids.dedup();
            ids
        };

        let mut constructs: Vec<ConstructScale> = Vec::new();
        let mut items: Vec<Item> = Vec::new();
        for qid in &questionnaire_ids {
            for scale in self.store.list_scales_for_questionnaire(*qid)? {
                if !constructs.iter().any(|c| c.id == scale.id) {
                    constructs.push(scale);
                }
            }
            for item in self.store.list_items_for_questionnaire(*qid)? {
                let wanted = ctx
                    .item_filter
                    .as_ref()
                    .map(|f| f.contains(&item.id))
                    .unwrap_or(true);
                if wanted && !items.iter().any(|i| i.id == item.id) {
                    items.push(item);
                }
            }
        }
        let construct_ids: Vec<ConstructScaleId> = constructs.iter().map(|c| c.id).collect();
        let composites = self.store.list_composites_for_scales(&construct_ids)?;

        // Raw responses prefetched once per submission.
        let mut responses: HashMap<SubmissionId, HashMap<ItemId, String>> = HashMap::new();
        for submission in &submissions {
            let per_item = self
                .store
                .list_responses(submission.id)?
                .into_iter()
                .map(|(item, raw)| (item.id, raw))
                .collect();
            responses.insert(submission.id, per_item);
        }

        let filter_hash = key::filter_hash(ctx);
        let patient_version = self.cache.patient_version(patient_id);
        let ttl = self.config.cache_ttl_patient;

        let mut construct_scores = Vec::with_capacity(constructs.len());
        for scale in &constructs {
            let cache_key =
                key::patient_scores(patient_version, patient_id, scale.id, &filter_hash);
            let result = self.cache.get_or_compute(
                &cache_key,
                ttl,
                deadline,
                || Ok(self.construct_result(scale, &submissions, anchor, ctx)),
                || CoreError::DeadlineExceeded,
            )?;
            construct_scores.push(result);
        }
        sort_topline(&mut construct_scores);

        let mut composite_scores = Vec::with_capacity(composites.len());
        for composite in &composites {
            let cache_key =
                key::patient_composite(patient_version, patient_id, composite.id, &filter_hash);
            let result = self.cache.get_or_compute(
                &cache_key,
                ttl,
                deadline,
                || Ok(self.composite_result(composite, &submissions, anchor, ctx)),
                || CoreError::DeadlineExceeded,
            )?;
            composite_scores.push(result);
        }

        let mut item_results = Vec::with_capacity(items.len());
        for item in &items {
            let likert = match item.likert_scale_id {
                Some(id) => Some(self.store.get_likert_scale(id)?),
                None => None,
            };
            let cache_key = key::patient_item(patient_version, patient_id, item.id, &filter_hash);
            let result = self.cache.get_or_compute(
                &cache_key,
                ttl,
                deadline,
                || {
                    Ok(self.item_result(
                        item,
                        likert.as_ref(),
                        &submissions,
                        &responses,
                        anchor,
                        ctx,
                    ))
                },
                || CoreError::DeadlineExceeded,
            )?;
            item_results.push(result);
        }

        let reference_date = Utc::now().date_naive();
        Ok(PatientReview {
            patient_summary: PatientSummary {
                patient_id,
                age: patient.age_on(reference_date),
                gender: patient.gender,
                registration_date: patient.registration_date,
            },
            questionnaires_overview,
            construct_scores,
            composite_scores,
            items: item_results,
            no_anchor,
        })
    }

    /// Reference-band statistics for overlaying on an index patient's
    /// series. An empty or anchorless cohort yields an empty series.
    pub fn get_cohort_aggregate(
        &self,
        caller: InstitutionId,
        target: AggregateTarget,
        ctx: &FilterContext,
        predicates: &CohortPredicates,
        kind: Option<AggregationKind>,
        index_patient: PatientId,
        deadline: Deadline,
    ) -> Result<Vec<BucketStat>, CoreError> {
        let patient = self.store.get_patient(index_patient)?;
        if patient.institution_id != caller {
            return Err(CoreError::Unauthorized);
        }

        let kind = kind.unwrap_or(self.config.aggregation_default);
        let cache_key = key::population_aggregate(
            self.cache.population_version(),
            target,
            ctx,
            predicates,
            kind,
            index_patient,
        );

        self.cache.get_or_compute(
            &cache_key,
            self.config.cache_ttl_population,
            deadline,
            || {
                match self.aggregator.aggregate(
                    target,
                    ctx,
                    predicates,
                    kind,
                    index_patient,
                    self.config.cohort_min_samples,
                    deadline,
                ) {
                    Ok(stats) => Ok(stats),
                    // Empty series, not errors, to the caller.
                    Err(AggregateError::NoAnchor) => Ok(Vec::new()),
                    Err(AggregateError::InsufficientCohort) => Ok(Vec::new()),
                    Err(AggregateError::Store(err)) => Err(CoreError::from(err)),
                    Err(AggregateError::DeadlineExceeded) => Err(CoreError::DeadlineExceeded),
                }
            },
            || CoreError::DeadlineExceeded,
        )
    }

    // ------------------------------------------------------------------
    // Review assembly
    // ------------------------------------------------------------------

    fn questionnaires_overview(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<QuestionnaireOverview>, CoreError> {
        let all_submissions = self.store.list_submissions(patient_id, None)?;
        let mut overview = Vec::new();
        for pq in self.store.list_patient_questionnaires(patient_id)? {
            if !pq.display {
                continue;
            }
            let questionnaire = self.store.get_questionnaire(pq.questionnaire_id)?;
            let own: Vec<&QuestionnaireSubmission> = all_submissions
                .iter()
                .filter(|s| s.patient_questionnaire_id == pq.id)
                .collect();
            overview.push(QuestionnaireOverview {
                questionnaire_id: pq.questionnaire_id,
                name: questionnaire.name,
                submission_count: own.len(),
                last_submission_at: own.first().map(|s| s.submitted_at),
            });
        }
        overview.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(overview)
    }

    /// `submissions` arrives newest first; the series is emitted in
    /// chronological order.
    fn construct_result(
        &self,
        scale: &ConstructScale,
        submissions: &[QuestionnaireSubmission],
        anchor: Option<NaiveDate>,
        ctx: &FilterContext,
    ) -> ConstructResult {
        let rows: Vec<(&QuestionnaireSubmission, Option<f64>)> = submissions
            .iter()
            .filter_map(|s| {
                self.scores
                    .construct_score(s.id, scale.id)
                    .map(|row| (s, row.score))
            })
            .collect();

        let current = rows.first().and_then(|(_, score)| *score);
        let previous = rows
            .iter()
            .skip(1)
            .find_map(|(_, score)| *score);

        let series = match anchor {
            Some(anchor) => rows
                .iter()
                .rev()
                .filter_map(|(s, score)| {
                    let t = bucket_index(anchor, s.submitted_at.date_naive(), ctx.granularity);
                    (t >= 0).then_some(SeriesPoint { t, v: *score })
                })
                .collect(),
            None => Vec::new(),
        };

        let interpretation = interpret(
            scale.direction,
            &scale.calibration,
            current,
            previous,
            self.config.change_fallback_ratio,
        );

        ConstructResult {
            construct_id: scale.id,
            name: scale.name.clone(),
            current,
            previous,
            series,
            interpretation,
        }
    }

    fn composite_result(
        &self,
        composite: &CompositeConstructScale,
        submissions: &[QuestionnaireSubmission],
        anchor: Option<NaiveDate>,
        ctx: &FilterContext,
    ) -> CompositeResult {
        let rows: Vec<(&QuestionnaireSubmission, Option<f64>)> = submissions
            .iter()
            .filter_map(|s| {
                self.scores
                    .composite_score(s.id, composite.id)
                    .map(|row| (s, row.score))
            })
            .collect();

        let current = rows.first().and_then(|(_, score)| *score);
        let previous = rows.iter().skip(1).find_map(|(_, score)| *score);

        let series = match anchor {
            Some(anchor) => rows
                .iter()
                .rev()
                .filter_map(|(s, score)| {
                    let t = bucket_index(anchor, s.submitted_at.date_naive(), ctx.granularity);
                    (t >= 0).then_some(SeriesPoint { t, v: *score })
                })
                .collect(),
            None => Vec::new(),
        };

        CompositeResult {
            composite_id: composite.id,
            name: composite.name.clone(),
            current,
            previous,
            series,
        }
    }

    fn item_result(
        &self,
        item: &Item,
        likert: Option<&LikertScale>,
        submissions: &[QuestionnaireSubmission],
        responses: &HashMap<SubmissionId, HashMap<ItemId, String>>,
        anchor: Option<NaiveDate>,
        ctx: &FilterContext,
    ) -> ItemResult {
        // Only submissions that actually answered the item contribute.
        let answered: Vec<(&QuestionnaireSubmission, &str, Option<f64>)> = submissions
            .iter()
            .filter_map(|s| {
                let raw = responses.get(&s.id)?.get(&item.id)?;
                let numeric = match classify_response(item, likert, Some(raw.as_str())) {
                    Value::Number(n) => Some(n),
                    _ => None,
                };
                Some((s, raw.as_str(), numeric))
            })
            .collect();

        let current = answered.first().and_then(|(_, _, numeric)| *numeric);
        let previous = answered
            .iter()
            .skip(1)
            .find_map(|(_, _, numeric)| *numeric);
        let latest_text = if item.response_type == ResponseType::Text {
            answered.first().map(|(_, raw, _)| raw.to_string())
        } else {
            None
        };

        let series = match anchor {
            Some(anchor) if item.response_type != ResponseType::Text => answered
                .iter()
                .rev()
                .filter_map(|(s, _, numeric)| {
                    let t = bucket_index(anchor, s.submitted_at.date_naive(), ctx.granularity);
                    (t >= 0).then_some(SeriesPoint { t, v: *numeric })
                })
                .collect(),
            _ => Vec::new(),
        };

        let interpretation = interpret(
            item.direction,
            &item.calibration,
            current,
            previous,
            self.config.change_fallback_ratio,
        );

        ItemResult {
            item_id: item.id,
            name: item.name.clone(),
            response_type: item.response_type,
            current,
            previous,
            latest_text,
            series,
            interpretation,
        }
    }
}
