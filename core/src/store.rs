//! Read-only domain store interface.
//!
//! The core never owns primary data; it reads snapshots through
//! [`ResponseStore`] and computes. [`MemoryStore`] is the reference
//! backend used throughout the test suites; production binds the trait
//! to whatever persistence the host system uses.

use crate::domain::*;
use crate::equation;
use crate::intervals::DateWindow;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::BTreeSet;
use thiserror::Error;

/// Reason code carried by every store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreReason {
    NotFound,
    Unavailable,
}

/// The single failure type of the store interface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store error ({reason:?}): {detail}")]
pub struct StoreError {
    pub reason: StoreReason,
    pub detail: String,
}

impl StoreError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self {
            reason: StoreReason::NotFound,
            detail: format!("{kind} {id}"),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            reason: StoreReason::Unavailable,
            detail: detail.into(),
        }
    }
}

/// Optional predicates narrowing a cohort inside one institution.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CohortPredicates {
    pub gender: Option<Gender>,
    pub diagnosis_category: Option<String>,
    pub treatment_type: Option<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

/// Read-only capability set the core depends on.
///
/// Implementations must provide repeatable-read snapshots within a
/// single computation; returned values are owned copies.
pub trait ResponseStore: Send + Sync {
    fn get_patient(&self, id: PatientId) -> Result<Patient, StoreError>;

    fn get_institution(&self, id: InstitutionId) -> Result<Institution, StoreError>;

    /// Submissions for a patient, newest first, clipped to `window`
    /// when given.
    fn list_submissions(
        &self,
        patient_id: PatientId,
        window: Option<&DateWindow>,
    ) -> Result<Vec<QuestionnaireSubmission>, StoreError>;

    fn get_submission(&self, id: SubmissionId) -> Result<QuestionnaireSubmission, StoreError>;

    /// Responses of a submission paired with their item snapshots.
    fn list_responses(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<(Item, String)>, StoreError>;

    fn get_item(&self, id: ItemId) -> Result<Item, StoreError>;

    fn get_likert_scale(&self, id: LikertScaleId) -> Result<LikertScale, StoreError>;

    fn get_construct_scale(&self, id: ConstructScaleId) -> Result<ConstructScale, StoreError>;

    fn get_questionnaire(&self, id: QuestionnaireId) -> Result<Questionnaire, StoreError>;

    /// Items of a questionnaire in display order.
    fn list_items_for_questionnaire(&self, id: QuestionnaireId) -> Result<Vec<Item>, StoreError>;

    /// Construct scales with at least one item in the questionnaire.
    fn list_scales_for_questionnaire(
        &self,
        id: QuestionnaireId,
    ) -> Result<Vec<ConstructScale>, StoreError>;

    fn list_items_for_construct(&self, id: ConstructScaleId) -> Result<Vec<Item>, StoreError>;

    /// Composite scales referencing any of the given constructs.
    fn list_composites_for_scales(
        &self,
        scales: &[ConstructScaleId],
    ) -> Result<Vec<CompositeConstructScale>, StoreError>;

    fn get_patient_questionnaire(
        &self,
        id: PatientQuestionnaireId,
    ) -> Result<PatientQuestionnaire, StoreError>;

    fn list_patient_questionnaires(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<PatientQuestionnaire>, StoreError>;

    fn list_diagnoses(&self, patient_id: PatientId) -> Result<Vec<Diagnosis>, StoreError>;

    fn list_treatments(&self, patient_id: PatientId) -> Result<Vec<Treatment>, StoreError>;

    /// Patients of one institution matching the predicates. Age cuts
    /// are evaluated as of `as_of`. The caller is responsible for
    /// excluding the index patient.
    fn list_cohort_patients(
        &self,
        institution_id: InstitutionId,
        predicates: &CohortPredicates,
        as_of: NaiveDate,
    ) -> Result<Vec<Patient>, StoreError>;
}

// ============================================================================
// In-memory reference backend
// ============================================================================

/// Concurrent in-memory store.
///
/// Insert helpers enforce the submission invariants: a response must
/// reference an item of the assigned questionnaire, and a second write
/// for the same (submission, item) replaces the first.
#[derive(Debug, Default)]
pub struct MemoryStore {
    institutions: DashMap<InstitutionId, Institution>,
    patients: DashMap<PatientId, Patient>,
    diagnoses: DashMap<DiagnosisId, Diagnosis>,
    treatments: DashMap<TreatmentId, Treatment>,
    questionnaires: DashMap<QuestionnaireId, Questionnaire>,
    questionnaire_items: DashMap<QuestionnaireId, Vec<QuestionnaireItem>>,
    items: DashMap<ItemId, Item>,
    likert_scales: DashMap<LikertScaleId, LikertScale>,
    range_scales: DashMap<RangeScaleId, RangeScale>,
    constructs: DashMap<ConstructScaleId, ConstructScale>,
    composites: DashMap<CompositeScaleId, CompositeConstructScale>,
    patient_questionnaires: DashMap<PatientQuestionnaireId, PatientQuestionnaire>,
    submissions: DashMap<SubmissionId, QuestionnaireSubmission>,
    responses: DashMap<SubmissionId, Vec<ItemResponse>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_institution(&self, institution: Institution) {
        self.institutions.insert(institution.id, institution);
    }

    pub fn insert_patient(&self, patient: Patient) {
        self.patients.insert(patient.id, patient);
    }

    pub fn insert_diagnosis(&self, diagnosis: Diagnosis) {
        self.diagnoses.insert(diagnosis.id, diagnosis);
    }

    pub fn insert_treatment(&self, treatment: Treatment) {
        self.treatments.insert(treatment.id, treatment);
    }

    pub fn insert_questionnaire(&self, questionnaire: Questionnaire) {
        self.questionnaires.insert(questionnaire.id, questionnaire);
    }

    pub fn insert_item(&self, item: Item) {
        self.items.insert(item.id, item);
    }

    pub fn insert_likert_scale(&self, scale: LikertScale) {
        self.likert_scales.insert(scale.id, scale);
    }

    pub fn insert_range_scale(&self, scale: RangeScale) {
        self.range_scales.insert(scale.id, scale);
    }

    /// Attach an item to a questionnaire at the given position.
    pub fn attach_item(&self, questionnaire_id: QuestionnaireId, item_id: ItemId, position: u32) {
        self.questionnaire_items
            .entry(questionnaire_id)
            .or_default()
            .push(QuestionnaireItem {
                questionnaire_id,
                item_id,
                position,
            });
    }

    /// Register a construct scale. The scoring equation is compiled
    /// here, against the item numbers currently attached to the
    /// construct; a rejected equation keeps the scale out of the store.
    pub fn register_construct(
        &self,
        scale: ConstructScale,
    ) -> Result<(), equation::CompileError> {
        let allowed: BTreeSet<u32> = self
            .items
            .iter()
            .filter(|entry| entry.value().construct_scale_id == Some(scale.id))
            .filter_map(|entry| entry.value().item_number)
            .collect();
        equation::Equation::compile(&scale.equation, &allowed)?;
        self.constructs.insert(scale.id, scale);
        Ok(())
    }

    pub fn insert_composite(&self, composite: CompositeConstructScale) {
        self.composites.insert(composite.id, composite);
    }

    pub fn insert_patient_questionnaire(&self, pq: PatientQuestionnaire) {
        self.patient_questionnaires.insert(pq.id, pq);
    }

    pub fn insert_submission(
        &self,
        submission: QuestionnaireSubmission,
    ) -> Result<(), StoreError> {
        if !self
            .patient_questionnaires
            .contains_key(&submission.patient_questionnaire_id)
        {
            return Err(StoreError::not_found(
                "patient questionnaire",
                submission.patient_questionnaire_id,
            ));
        }
        self.submissions.insert(submission.id, submission);
        Ok(())
    }

    /// Record a response, replacing any earlier response for the same
    /// (submission, item) pair. Rejects items outside the submission's
    /// questionnaire.
    pub fn insert_response(&self, response: ItemResponse) -> Result<(), StoreError> {
        let submission = self.get_submission(response.submission_id)?;
        let pq = self
            .patient_questionnaires
            .get(&submission.patient_questionnaire_id)
            .ok_or_else(|| {
                StoreError::not_found(
                    "patient questionnaire",
                    submission.patient_questionnaire_id,
                )
            })?;
        let assigned = self
            .questionnaire_items
            .get(&pq.questionnaire_id)
            .map(|entries| entries.iter().any(|qi| qi.item_id == response.item_id))
            .unwrap_or(false);
        if !assigned {
            return Err(StoreError {
                reason: StoreReason::NotFound,
                detail: format!(
                    "item {} is not part of questionnaire {}",
                    response.item_id, pq.questionnaire_id
                ),
            });
        }

        let mut entries = self.responses.entry(response.submission_id).or_default();
        entries.retain(|r| r.item_id != response.item_id);
        entries.push(response);
        Ok(())
    }

    pub fn remove_submission(&self, id: SubmissionId) {
        self.submissions.remove(&id);
        self.responses.remove(&id);
    }
}

impl ResponseStore for MemoryStore {
    fn get_patient(&self, id: PatientId) -> Result<Patient, StoreError> {
        self.patients
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("patient", id))
    }

    fn get_institution(&self, id: InstitutionId) -> Result<Institution, StoreError> {
        self.institutions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("institution", id))
    }

    fn list_submissions(
        &self,
        patient_id: PatientId,
        window: Option<&DateWindow>,
    ) -> Result<Vec<QuestionnaireSubmission>, StoreError> {
        let mut out: Vec<QuestionnaireSubmission> = self
            .submissions
            .iter()
            .filter(|entry| entry.value().patient_id == patient_id)
            .filter(|entry| {
                window
                    .map(|w| w.contains(entry.value().submitted_at.date_naive()))
                    .unwrap_or(true)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(out)
    }

    fn get_submission(&self, id: SubmissionId) -> Result<QuestionnaireSubmission, StoreError> {
        self.submissions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("submission", id))
    }

    fn list_responses(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<(Item, String)>, StoreError> {
        let entries = match self.responses.get(&submission_id) {
            Some(entries) => entries.clone(),
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity(entries.len());
        for response in entries {
            let item = self.get_item(response.item_id)?;
            out.push((item, response.response_value));
        }
        Ok(out)
    }

    fn get_item(&self, id: ItemId) -> Result<Item, StoreError> {
        self.items
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("item", id))
    }

    fn get_likert_scale(&self, id: LikertScaleId) -> Result<LikertScale, StoreError> {
        self.likert_scales
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("likert scale", id))
    }

    fn get_construct_scale(&self, id: ConstructScaleId) -> Result<ConstructScale, StoreError> {
        self.constructs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("construct scale", id))
    }

    fn get_questionnaire(&self, id: QuestionnaireId) -> Result<Questionnaire, StoreError> {
        self.questionnaires
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("questionnaire", id))
    }

    fn list_items_for_questionnaire(&self, id: QuestionnaireId) -> Result<Vec<Item>, StoreError> {
        let mut placements = self
            .questionnaire_items
            .get(&id)
            .map(|entries| entries.clone())
            .unwrap_or_default();
        placements.sort_by_key(|qi| qi.position);
        placements
            .into_iter()
            .map(|qi| self.get_item(qi.item_id))
            .collect()
    }

    fn list_scales_for_questionnaire(
        &self,
        id: QuestionnaireId,
    ) -> Result<Vec<ConstructScale>, StoreError> {
        let items = self.list_items_for_questionnaire(id)?;
        let mut scale_ids: Vec<ConstructScaleId> =
            items.iter().filter_map(|i| i.construct_scale_id).collect();
        scale_ids.sort();
        scale_ids.dedup();
        scale_ids
            .into_iter()
            .map(|sid| self.get_construct_scale(sid))
            .collect()
    }

    fn list_items_for_construct(&self, id: ConstructScaleId) -> Result<Vec<Item>, StoreError> {
        let mut out: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| entry.value().construct_scale_id == Some(id))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|i| i.item_number);
        Ok(out)
    }

    fn list_composites_for_scales(
        &self,
        scales: &[ConstructScaleId],
    ) -> Result<Vec<CompositeConstructScale>, StoreError> {
        let mut out: Vec<CompositeConstructScale> = self
            .composites
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .construct_ids
                    .iter()
                    .any(|cid| scales.contains(cid))
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|c| c.id);
        Ok(out)
    }

    fn get_patient_questionnaire(
        &self,
        id: PatientQuestionnaireId,
    ) -> Result<PatientQuestionnaire, StoreError> {
        self.patient_questionnaires
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("patient questionnaire", id))
    }

    fn list_patient_questionnaires(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<PatientQuestionnaire>, StoreError> {
        Ok(self
            .patient_questionnaires
            .iter()
            .filter(|entry| entry.value().patient_id == patient_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn list_diagnoses(&self, patient_id: PatientId) -> Result<Vec<Diagnosis>, StoreError> {
        Ok(self
            .diagnoses
            .iter()
            .filter(|entry| entry.value().patient_id == patient_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn list_treatments(&self, patient_id: PatientId) -> Result<Vec<Treatment>, StoreError> {
        let diagnosis_ids: Vec<DiagnosisId> = self
            .diagnoses
            .iter()
            .filter(|entry| entry.value().patient_id == patient_id)
            .map(|entry| *entry.key())
            .collect();
        Ok(self
            .treatments
            .iter()
            .filter(|entry| diagnosis_ids.contains(&entry.value().diagnosis_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn list_cohort_patients(
        &self,
        institution_id: InstitutionId,
        predicates: &CohortPredicates,
        as_of: NaiveDate,
    ) -> Result<Vec<Patient>, StoreError> {
        let mut out = Vec::new();
        for entry in self.patients.iter() {
            let patient = entry.value();
            if patient.institution_id != institution_id {
                continue;
            }
            if let Some(gender) = predicates.gender {
                if patient.gender != Some(gender) {
                    continue;
                }
            }
            if let Some(min_age) = predicates.min_age {
                match patient.age_on(as_of) {
                    Some(age) if age >= min_age => {}
                    _ => continue,
                }
            }
            if let Some(max_age) = predicates.max_age {
                match patient.age_on(as_of) {
                    Some(age) if age <= max_age => {}
                    _ => continue,
                }
            }
            if let Some(category) = &predicates.diagnosis_category {
                let matches = self.list_diagnoses(patient.id)?.iter().any(|d| {
                    d.category.eq_ignore_ascii_case(category)
                });
                if !matches {
                    continue;
                }
            }
            if let Some(treatment_type) = &predicates.treatment_type {
                let matches = self.list_treatments(patient.id)?.iter().any(|t| {
                    t.treatment_types
                        .iter()
                        .any(|tt| tt.eq_ignore_ascii_case(treatment_type))
                });
                if !matches {
                    continue;
                }
            }
            out.push(patient.clone());
        }
        out.sort_by_key(|p| p.id);
        Ok(out)
    }
}
