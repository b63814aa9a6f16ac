//! Entity snapshots.
//!
//! Free-text patient fields arrive from the store already encrypted or
//! pseudonymized; the core treats them as opaque strings and never puts
//! them in cache keys or aggregate output.

use super::ids::*;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Transgender,
    NonBinary,
    PreferNotToSay,
    Other,
}

/// Clinical sense of a higher numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherBetter,
    LowerBetter,
    MiddleBetter,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Text,
    Number,
    Likert,
    Range,
}

/// How a composite scale folds its member construct scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combiner {
    Sum,
    Product,
    Mean,
    Median,
    Mode,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentIntent {
    Preventive,
    Curative,
    Palliative,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub institution_id: InstitutionId,
    /// Opaque pseudonymous reference (the chart id as stored, encrypted).
    pub external_ref: String,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub registration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// Age in whole years on the given date, when the birth date is known.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        if date < birth {
            return None;
        }
        let mut age = date.year() - birth.year();
        if (date.month(), date.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: DiagnosisId,
    pub patient_id: PatientId,
    /// Category label from the institution's diagnosis list.
    pub category: String,
    pub icd11_code: Option<String>,
    pub diagnosed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: TreatmentId,
    pub diagnosis_id: DiagnosisId,
    /// Treatment-type tags delivered synchronously in this entry.
    pub treatment_types: Vec<String>,
    pub intent: Option<TreatmentIntent>,
    pub started_on: Option<NaiveDate>,
    pub ended_on: Option<NaiveDate>,
    pub ongoing: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreatmentDateError {
    #[error("treatment end date precedes start date")]
    EndBeforeStart,
    #[error("ongoing treatment must not carry an end date")]
    OngoingWithEnd,
}

impl Treatment {
    pub fn new(
        diagnosis_id: DiagnosisId,
        treatment_types: Vec<String>,
        intent: Option<TreatmentIntent>,
        started_on: Option<NaiveDate>,
        ended_on: Option<NaiveDate>,
        ongoing: bool,
    ) -> Result<Self, TreatmentDateError> {
        if let (Some(start), Some(end)) = (started_on, ended_on) {
            if end < start {
                return Err(TreatmentDateError::EndBeforeStart);
            }
        }
        if ongoing && ended_on.is_some() {
            return Err(TreatmentDateError::OngoingWithEnd);
        }
        Ok(Self {
            id: TreatmentId::new(),
            diagnosis_id,
            treatment_types,
            intent,
            started_on,
            ended_on,
            ongoing,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: QuestionnaireId,
    /// Stable display-name key; translation is a lookup outside the core.
    pub name: String,
}

/// Placement of an item inside a questionnaire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireItem {
    pub questionnaire_id: QuestionnaireId,
    pub item_id: ItemId,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikertOption {
    pub option_value: i64,
    pub option_text: String,
    pub option_order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikertScale {
    pub id: LikertScaleId,
    pub name: String,
    pub options: Vec<LikertOption>,
}

impl LikertScale {
    pub fn has_option_value(&self, value: i64) -> bool {
        self.options.iter().any(|o| o.option_value == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeScale {
    pub id: RangeScaleId,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: Option<f64>,
}

impl RangeScale {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Calibration constants shared by items and construct scales.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Calibration {
    pub normative_mean: Option<f64>,
    pub normative_sd: Option<f64>,
    pub threshold: Option<f64>,
    /// Minimum important difference.
    pub mid: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub response_type: ResponseType,
    pub construct_scale_id: Option<ConstructScaleId>,
    /// Position of this item within its construct; the `{qN}` reference
    /// in the construct's equation resolves against this number.
    pub item_number: Option<u32>,
    pub likert_scale_id: Option<LikertScaleId>,
    pub range_scale_id: Option<RangeScaleId>,
    pub direction: Direction,
    pub calibration: Calibration,
    /// Declared at registration: the numeric stand-in for an unanswered
    /// item. Absent means an unanswered item evaluates as null.
    pub missing_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructScale {
    pub id: ConstructScaleId,
    pub name: String,
    pub direction: Direction,
    pub calibration: Calibration,
    /// Scores with fewer answered numeric items than this are null.
    pub minimum_number_of_items: u32,
    /// Scoring equation source; compiled at registration.
    pub equation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeConstructScale {
    pub id: CompositeScaleId,
    pub name: String,
    pub construct_ids: Vec<ConstructScaleId>,
    pub combiner: Combiner,
}

/// Assignment of a questionnaire to a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientQuestionnaire {
    pub id: PatientQuestionnaireId,
    pub patient_id: PatientId,
    pub questionnaire_id: QuestionnaireId,
    pub display: bool,
}

/// A single completion event of a questionnaire by a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireSubmission {
    pub id: SubmissionId,
    pub patient_id: PatientId,
    pub patient_questionnaire_id: PatientQuestionnaireId,
    pub submitted_at: DateTime<Utc>,
}

/// Raw response as stored: always a string, typed on the way out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub submission_id: SubmissionId,
    pub item_id: ItemId,
    pub response_value: String,
}
