//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use promcore::cache::MemoryCache;
use promcore::domain::*;
use promcore::engine::AnalyticsEngine;
use promcore::store::{MemoryStore, ResponseStore};
use promcore::CoreConfig;
use std::sync::Arc;

pub struct World {
    pub store: Arc<MemoryStore>,
    pub engine: AnalyticsEngine,
    pub institution: InstitutionId,
}

pub fn world() -> World {
    world_with_config(CoreConfig::default())
}

pub fn world_with_config(config: CoreConfig) -> World {
    let store = Arc::new(MemoryStore::new());
    let institution = InstitutionId::new();
    store.insert_institution(Institution {
        id: institution,
        name: "General Hospital".to_string(),
    });
    let engine = AnalyticsEngine::new(
        Arc::clone(&store) as Arc<dyn ResponseStore>,
        Arc::new(MemoryCache::new()),
        config,
    );
    World {
        store,
        engine,
        institution,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn noon(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

impl World {
    pub fn add_patient(
        &self,
        gender: Gender,
        birth_year: i32,
        registration: Option<NaiveDate>,
    ) -> PatientId {
        let patient = Patient {
            id: PatientId::new(),
            institution_id: self.institution,
            external_ref: "enc:chart".to_string(),
            birth_date: NaiveDate::from_ymd_opt(birth_year, 6, 15),
            gender: Some(gender),
            registration_date: registration,
            created_at: Utc::now(),
        };
        let id = patient.id;
        self.store.insert_patient(patient);
        id
    }

    /// A questionnaire of `n_items` five-point Likert items q1..qN, all
    /// belonging to one construct scale scored by `equation`.
    pub fn likert_construct(
        &self,
        name: &str,
        n_items: u32,
        minimum_number_of_items: u32,
        direction: Direction,
        calibration: Calibration,
        equation: &str,
    ) -> (QuestionnaireId, ConstructScaleId, Vec<ItemId>) {
        let likert = LikertScale {
            id: LikertScaleId::new(),
            name: format!("{name} options"),
            options: (1..=5)
                .map(|v| LikertOption {
                    option_value: v,
                    option_text: format!("level {v}"),
                    option_order: v as u32,
                })
                .collect(),
        };
        let likert_id = likert.id;
        self.store.insert_likert_scale(likert);

        let questionnaire = Questionnaire {
            id: QuestionnaireId::new(),
            name: format!("{name} questionnaire"),
        };
        let questionnaire_id = questionnaire.id;
        self.store.insert_questionnaire(questionnaire);

        let construct_id = ConstructScaleId::new();
        let mut item_ids = Vec::new();
        for number in 1..=n_items {
            let item = Item {
                id: ItemId::new(),
                name: format!("{name} q{number}"),
                response_type: ResponseType::Likert,
                construct_scale_id: Some(construct_id),
                item_number: Some(number),
                likert_scale_id: Some(likert_id),
                range_scale_id: None,
                direction,
                calibration: Calibration::default(),
                missing_value: None,
            };
            item_ids.push(item.id);
            self.store.insert_item(item.clone());
            self.store.attach_item(questionnaire_id, item.id, number);
        }

        self.store
            .register_construct(ConstructScale {
                id: construct_id,
                name: name.to_string(),
                direction,
                calibration,
                minimum_number_of_items,
                equation: equation.to_string(),
            })
            .expect("construct equation compiles");

        (questionnaire_id, construct_id, item_ids)
    }

    pub fn assign(
        &self,
        patient_id: PatientId,
        questionnaire_id: QuestionnaireId,
    ) -> PatientQuestionnaireId {
        let pq = PatientQuestionnaire {
            id: PatientQuestionnaireId::new(),
            patient_id,
            questionnaire_id,
            display: true,
        };
        let id = pq.id;
        self.store.insert_patient_questionnaire(pq);
        id
    }

    /// Submit answers for items q1..qN (by position in `item_ids`);
    /// `None` leaves the item unanswered. Scores the submission through
    /// the engine hook.
    pub fn submit(
        &self,
        patient_id: PatientId,
        pq_id: PatientQuestionnaireId,
        item_ids: &[ItemId],
        on: NaiveDate,
        answers: &[Option<&str>],
    ) -> SubmissionId {
        let submission = QuestionnaireSubmission {
            id: SubmissionId::new(),
            patient_id,
            patient_questionnaire_id: pq_id,
            submitted_at: Utc
                .with_ymd_and_hms(
                    chrono::Datelike::year(&on),
                    chrono::Datelike::month(&on),
                    chrono::Datelike::day(&on),
                    12,
                    0,
                    0,
                )
                .unwrap(),
        };
        let submission_id = submission.id;
        self.store.insert_submission(submission).unwrap();

        for (item_id, answer) in item_ids.iter().zip(answers) {
            if let Some(value) = answer {
                self.store
                    .insert_response(ItemResponse {
                        submission_id,
                        item_id: *item_id,
                        response_value: value.to_string(),
                    })
                    .unwrap();
            }
        }

        self.engine.on_submission_written(submission_id).unwrap();
        submission_id
    }
}
