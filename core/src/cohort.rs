//! Cohort aggregation.
//!
//! Produces per-bucket reference statistics over an institution-scoped
//! cohort, always excluding the index patient, evaluated only at the
//! bucket indices present in the index patient's own series. Output
//! carries no patient-identifying information.

use crate::domain::{ConstructScaleId, ItemId, Patient, PatientId};
use crate::domain::classify_response;
use crate::engine::Deadline;
use crate::equation::Value;
use crate::intervals::{bucket_index, window, FilterContext};
use crate::scores::ScoreStore;
use crate::stats;
use crate::store::{CohortPredicates, ResponseStore, StoreError};
use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Band half-width in standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdFactor {
    Half,
    One,
    OneAndHalf,
    Two,
    TwoAndHalf,
}

impl SdFactor {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Half => 0.5,
            Self::One => 1.0,
            Self::OneAndHalf => 1.5,
            Self::Two => 2.0,
            Self::TwoAndHalf => 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    MedianIqr,
    MeanCi95,
    MeanSd(SdFactor),
}

/// What the cohort statistics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateTarget {
    Construct(ConstructScaleId),
    Item(ItemId),
}

/// One bucket of the reference band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStat {
    pub bucket: i64,
    pub center: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub n: usize,
    pub insufficient_samples: bool,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("index patient lacks the requested anchor date")]
    NoAnchor,

    #[error("cohort is empty after filters")]
    InsufficientCohort,

    #[error("deadline expired during aggregation")]
    DeadlineExceeded,
}

pub struct CohortAggregator {
    store: Arc<dyn ResponseStore>,
    scores: Arc<ScoreStore>,
}

impl CohortAggregator {
    pub fn new(store: Arc<dyn ResponseStore>, scores: Arc<ScoreStore>) -> Self {
        Self { store, scores }
    }

    /// Compute the reference band for one target.
    ///
    /// Cohort members without the requested anchor are skipped; a
    /// bucket with no cohort values yields a null statistic.
    pub fn aggregate(
        &self,
        target: AggregateTarget,
        ctx: &FilterContext,
        predicates: &CohortPredicates,
        kind: AggregationKind,
        index_patient: PatientId,
        min_samples: usize,
        deadline: Deadline,
    ) -> Result<Vec<BucketStat>, AggregateError> {
        let index = self.store.get_patient(index_patient)?;
        let index_anchor = resolve_anchor(self.store.as_ref(), &index, ctx)?
            .ok_or(AggregateError::NoAnchor)?;

        let index_values = self.patient_bucket_values(&index, index_anchor, target, ctx)?;
        let index_buckets: BTreeSet<i64> = index_values.iter().map(|(b, _)| *b).collect();
        if index_buckets.is_empty() {
            return Ok(Vec::new());
        }

        let as_of = Utc::now().date_naive();
        let cohort: Vec<Patient> = self
            .store
            .list_cohort_patients(index.institution_id, predicates, as_of)?
            .into_iter()
            .filter(|p| p.id != index_patient)
            .collect();
        if cohort.is_empty() {
            return Err(AggregateError::InsufficientCohort);
        }
        debug!(
            cohort_size = cohort.len(),
            buckets = index_buckets.len(),
            "aggregating cohort"
        );

        let member_values: Vec<Vec<(i64, f64)>> = cohort
            .par_iter()
            .map(|member| -> Result<Vec<(i64, f64)>, AggregateError> {
                if deadline.expired() {
                    return Err(AggregateError::DeadlineExceeded);
                }
                let Some(anchor) = resolve_anchor(self.store.as_ref(), member, ctx)? else {
                    // Members without the anchor contribute nothing.
                    return Ok(Vec::new());
                };
                Ok(self.patient_bucket_values(member, anchor, target, ctx)?)
            })
            .collect::<Result<_, _>>()?;

        let mut pools: BTreeMap<i64, Vec<f64>> =
            index_buckets.iter().map(|b| (*b, Vec::new())).collect();
        for values in member_values {
            for (bucket, value) in values {
                // Only buckets present in the index series are reported;
                // points outside them are never interpolated.
                if let Some(pool) = pools.get_mut(&bucket) {
                    pool.push(value);
                }
            }
        }

        Ok(pools
            .into_iter()
            .map(|(bucket, values)| compute_bucket_stat(kind, bucket, &values, min_samples))
            .collect())
    }

    /// Bucketed numeric values of one patient for the target, clipped
    /// to the window. Null scores drop out here.
    fn patient_bucket_values(
        &self,
        patient: &Patient,
        anchor: NaiveDate,
        target: AggregateTarget,
        ctx: &FilterContext,
    ) -> Result<Vec<(i64, f64)>, StoreError> {
        let w = window(anchor, ctx);
        let submissions = self.store.list_submissions(patient.id, Some(&w))?;

        // Item metadata fetched once, not per submission.
        let item_context = match target {
            AggregateTarget::Item(item_id) => {
                let item = self.store.get_item(item_id)?;
                let likert = match item.likert_scale_id {
                    Some(id) => Some(self.store.get_likert_scale(id)?),
                    None => None,
                };
                Some((item, likert))
            }
            AggregateTarget::Construct(_) => None,
        };

        let mut out = Vec::new();
        for submission in submissions {
            if let Some(filter) = &ctx.questionnaire_filter {
                let pq = self
                    .store
                    .get_patient_questionnaire(submission.patient_questionnaire_id)?;
                if !filter.contains(&pq.questionnaire_id) {
                    continue;
                }
            }

            let bucket = bucket_index(anchor, submission.submitted_at.date_naive(), ctx.granularity);
            if bucket < 0 {
                continue;
            }

            let value = match target {
                AggregateTarget::Construct(construct_id) => self
                    .scores
                    .construct_score(submission.id, construct_id)
                    .and_then(|row| row.score),
                AggregateTarget::Item(item_id) => {
                    let (item, likert) = item_context.as_ref().expect("item context prefetched");
                    self.store
                        .list_responses(submission.id)?
                        .iter()
                        .find(|(i, _)| i.id == item_id)
                        .and_then(|(_, raw)| {
                            match classify_response(item, likert.as_ref(), Some(raw.as_str())) {
                                Value::Number(n) => Some(n),
                                _ => None,
                            }
                        })
                }
            };

            if let Some(value) = value {
                out.push((bucket, value));
            }
        }
        Ok(out)
    }
}

/// Resolve a patient's anchor date under the filter context. `None`
/// means the anchor entity or its date is missing; bucket-dependent
/// computation for that patient is skipped.
pub fn resolve_anchor(
    store: &dyn ResponseStore,
    patient: &Patient,
    ctx: &FilterContext,
) -> Result<Option<NaiveDate>, StoreError> {
    use crate::intervals::AnchorKind;

    match ctx.anchor {
        AnchorKind::Registration => Ok(patient.registration_date),
        AnchorKind::Diagnosis(diagnosis_id) => Ok(store
            .list_diagnoses(patient.id)?
            .into_iter()
            .find(|d| d.id == diagnosis_id)
            .and_then(|d| d.diagnosed_on)),
        AnchorKind::TreatmentStart(treatment_id) => Ok(store
            .list_treatments(patient.id)?
            .into_iter()
            .find(|t| t.id == treatment_id)
            .and_then(|t| t.started_on)),
    }
}

/// Statistic for one bucket pool.
fn compute_bucket_stat(
    kind: AggregationKind,
    bucket: i64,
    values: &[f64],
    min_samples: usize,
) -> BucketStat {
    if values.is_empty() {
        return BucketStat {
            bucket,
            center: None,
            low: None,
            high: None,
            n: 0,
            insufficient_samples: true,
        };
    }

    let n = values.len();
    match kind {
        AggregationKind::MedianIqr => {
            let center = stats::median(values);
            let low = stats::quantile(values, 0.25);
            let high = stats::quantile(values, 0.75);
            BucketStat {
                bucket,
                center,
                low,
                high,
                n,
                insufficient_samples: false,
            }
        }
        AggregationKind::MeanCi95 => {
            if n >= min_samples {
                let (center, low, high) = stats::mean_ci95(values).expect("non-empty pool");
                BucketStat {
                    bucket,
                    center: Some(center),
                    low: Some(low),
                    high: Some(high),
                    n,
                    insufficient_samples: false,
                }
            } else {
                let center = stats::mean(values);
                BucketStat {
                    bucket,
                    center,
                    low: center,
                    high: center,
                    n,
                    insufficient_samples: true,
                }
            }
        }
        AggregationKind::MeanSd(factor) => {
            let center = stats::mean(values).expect("non-empty pool");
            let sd = stats::sample_sd(values).expect("non-empty pool");
            let half_width = factor.multiplier() * sd;
            BucketStat {
                bucket,
                center: Some(center),
                low: Some(center - half_width),
                high: Some(center + half_width),
                n,
                insufficient_samples: false,
            }
        }
    }
}
