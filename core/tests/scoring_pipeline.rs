//! Integration tests for the score computer: submission in, derived
//! rows out.

mod common;

use common::*;
use promcore::domain::*;

#[test]
fn test_simple_likert_construct_scores_mean_over_available() {
    let w = world();
    let patient = w.add_patient(Gender::Female, 1980, Some(date(2024, 1, 1)));
    let cal = Calibration {
        threshold: Some(3.0),
        mid: Some(0.5),
        ..Default::default()
    };
    let (q_id, construct_id, items) = w.likert_construct(
        "Physical Function",
        4,
        3,
        Direction::HigherBetter,
        cal,
        "sum({q1}, {q2}, {q3}, {q4}) / count_available({q1}, {q2}, {q3}, {q4})",
    );
    let pq = w.assign(patient, q_id);

    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 1, 8),
        &[Some("4"), Some("5"), Some("4"), None],
    );

    let row = w
        .engine
        .scores()
        .construct_score(submission, construct_id)
        .expect("construct row exists");
    let score = row.score.expect("score is non-null");
    assert!((score - 13.0 / 3.0).abs() < 1e-9, "score = {score}");
}

#[test]
fn test_null_propagating_equation_yields_null_row() {
    // The same responses through a plain arithmetic mean: `+` with a
    // null operand nulls the entire expression.
    let w = world();
    let patient = w.add_patient(Gender::Female, 1980, Some(date(2024, 1, 1)));
    let (q_id, construct_id, items) = w.likert_construct(
        "Fatigue",
        4,
        3,
        Direction::HigherBetter,
        Calibration::default(),
        "({q1} + {q2} + {q3} + {q4}) / 4",
    );
    let pq = w.assign(patient, q_id);

    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 1, 8),
        &[Some("4"), Some("5"), Some("4"), None],
    );

    let row = w
        .engine
        .scores()
        .construct_score(submission, construct_id)
        .expect("construct row exists");
    assert_eq!(row.score, None);
}

#[test]
fn test_minimum_items_override_forces_null() {
    let w = world();
    let patient = w.add_patient(Gender::Male, 1975, Some(date(2024, 1, 1)));
    let (q_id, construct_id, items) = w.likert_construct(
        "Pain Interference",
        4,
        3,
        Direction::LowerBetter,
        Calibration::default(),
        "sum({q1}, {q2}, {q3}, {q4}) / count_available({q1}, {q2}, {q3}, {q4})",
    );
    let pq = w.assign(patient, q_id);

    // Two answers: the equation alone would produce 4.5, the minimum
    // of three answered items forces null.
    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 1, 8),
        &[Some("4"), Some("5"), None, None],
    );

    let row = w
        .engine
        .scores()
        .construct_score(submission, construct_id)
        .expect("row exists even when null");
    assert_eq!(row.score, None);
}

#[test]
fn test_every_applicable_construct_gets_exactly_one_row() {
    let w = world();
    let patient = w.add_patient(Gender::Female, 1990, Some(date(2024, 1, 1)));
    let (q_id, construct_id, items) = w.likert_construct(
        "Anxiety",
        3,
        1,
        Direction::LowerBetter,
        Calibration::default(),
        "mean({q1}, {q2}, {q3})",
    );
    let pq = w.assign(patient, q_id);
    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 2, 1),
        &[Some("2"), Some("3"), Some("4")],
    );

    let rows = w.engine.scores().construct_scores_for_submission(submission);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].construct_id, construct_id);
    assert_eq!(rows[0].score, Some(3.0));
}

#[test]
fn test_on_submission_written_is_idempotent() {
    let w = world();
    let patient = w.add_patient(Gender::Female, 1985, Some(date(2024, 1, 1)));
    let (q_id, construct_id, items) = w.likert_construct(
        "Depression",
        3,
        1,
        Direction::LowerBetter,
        Calibration::default(),
        "mean({q1}, {q2}, {q3})",
    );
    let pq = w.assign(patient, q_id);
    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 2, 1),
        &[Some("1"), Some("2"), Some("3")],
    );

    let before = w.engine.scores().construct_scores_for_submission(submission);
    for _ in 0..3 {
        w.engine.on_submission_written(submission).unwrap();
    }
    let after = w.engine.scores().construct_scores_for_submission(submission);

    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].construct_id, after[0].construct_id);
    assert_eq!(before[0].score, after[0].score);
}

#[test]
fn test_response_mutation_recomputes_row() {
    let w = world();
    let patient = w.add_patient(Gender::Male, 1970, Some(date(2024, 1, 1)));
    let (q_id, construct_id, items) = w.likert_construct(
        "Sleep",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let pq = w.assign(patient, q_id);
    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 2, 1),
        &[Some("2"), Some("2")],
    );
    assert_eq!(
        w.engine
            .scores()
            .construct_score(submission, construct_id)
            .unwrap()
            .score,
        Some(2.0)
    );

    // Amend one response and re-run the hook.
    w.store
        .insert_response(ItemResponse {
            submission_id: submission,
            item_id: items[0],
            response_value: "4".to_string(),
        })
        .unwrap();
    w.engine.on_submission_written(submission).unwrap();

    assert_eq!(
        w.engine
            .scores()
            .construct_score(submission, construct_id)
            .unwrap()
            .score,
        Some(3.0)
    );
}

#[test]
fn test_composite_mean_drops_null_members() {
    let w = world();
    let patient = w.add_patient(Gender::Female, 1988, Some(date(2024, 1, 1)));

    let (q1_id, c1, items1) = w.likert_construct(
        "Mobility",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let (q2_id, c2, items2) = w.likert_construct(
        "Dexterity",
        2,
        2,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );

    let composite_id = CompositeScaleId::new();
    w.store.insert_composite(CompositeConstructScale {
        id: composite_id,
        name: "Physical".to_string(),
        construct_ids: vec![c1, c2],
        combiner: Combiner::Mean,
    });

    let pq1 = w.assign(patient, q1_id);
    let pq2 = w.assign(patient, q2_id);

    // C1 scores 4.0; C2 is null (below its minimum of two items).
    let s1 = w.submit(patient, pq1, &items1, date(2024, 2, 1), &[Some("4"), Some("4")]);
    assert_eq!(
        w.engine
            .scores()
            .composite_score(s1, composite_id)
            .unwrap()
            .score,
        Some(4.0)
    );

    let s2 = w.submit(patient, pq2, &items2, date(2024, 2, 2), &[Some("3"), None]);
    let row = w.engine.scores().composite_score(s2, composite_id).unwrap();
    // Both members null for this submission (C1 has no items here).
    assert_eq!(row.score, None);
}

#[test]
fn test_composite_combiners_over_shared_questionnaire() {
    // Two constructs on one questionnaire, a composite over both.
    let w = world();
    let patient = w.add_patient(Gender::Male, 1992, Some(date(2024, 1, 1)));

    let questionnaire = Questionnaire {
        id: QuestionnaireId::new(),
        name: "Combined".to_string(),
    };
    let q_id = questionnaire.id;
    w.store.insert_questionnaire(questionnaire);

    let mut item_ids = Vec::new();
    let mut construct_ids = Vec::new();
    for (offset, name) in [(0u32, "Left"), (2u32, "Right")] {
        let construct_id = ConstructScaleId::new();
        construct_ids.push(construct_id);
        for number in 1..=2u32 {
            let item = Item {
                id: ItemId::new(),
                name: format!("{name} {number}"),
                response_type: ResponseType::Number,
                construct_scale_id: Some(construct_id),
                item_number: Some(number),
                likert_scale_id: None,
                range_scale_id: None,
                direction: Direction::HigherBetter,
                calibration: Calibration::default(),
                missing_value: None,
            };
            item_ids.push(item.id);
            w.store.insert_item(item.clone());
            w.store.attach_item(q_id, item.id, offset + number);
        }
        w.store
            .register_construct(ConstructScale {
                id: construct_id,
                name: name.to_string(),
                direction: Direction::HigherBetter,
                calibration: Calibration::default(),
                minimum_number_of_items: 1,
                equation: "mean({q1}, {q2})".to_string(),
            })
            .unwrap();
    }

    let composite_id = CompositeScaleId::new();
    w.store.insert_composite(CompositeConstructScale {
        id: composite_id,
        name: "Total".to_string(),
        construct_ids: construct_ids.clone(),
        combiner: Combiner::Sum,
    });

    let pq = w.assign(patient, q_id);
    // Left = mean(10, 20) = 15; Right = mean(2, 4) = 3; Sum = 18.
    let submission = w.submit(
        patient,
        pq,
        &item_ids,
        date(2024, 3, 1),
        &[Some("10"), Some("20"), Some("2"), Some("4")],
    );

    assert_eq!(
        w.engine
            .scores()
            .construct_score(submission, construct_ids[0])
            .unwrap()
            .score,
        Some(15.0)
    );
    assert_eq!(
        w.engine
            .scores()
            .construct_score(submission, construct_ids[1])
            .unwrap()
            .score,
        Some(3.0)
    );
    assert_eq!(
        w.engine
            .scores()
            .composite_score(submission, composite_id)
            .unwrap()
            .score,
        Some(18.0)
    );
}

#[test]
fn test_destroyed_submission_drops_derived_rows() {
    let w = world();
    let patient = w.add_patient(Gender::Female, 1983, Some(date(2024, 1, 1)));
    let (q_id, construct_id, items) = w.likert_construct(
        "Energy",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let pq = w.assign(patient, q_id);
    let submission = w.submit(
        patient,
        pq,
        &items,
        date(2024, 2, 1),
        &[Some("3"), Some("3")],
    );
    assert!(w
        .engine
        .scores()
        .construct_score(submission, construct_id)
        .is_some());

    w.store.remove_submission(submission);
    w.engine.on_submission_destroyed(submission, patient);

    assert!(w
        .engine
        .scores()
        .construct_score(submission, construct_id)
        .is_none());
}

#[test]
fn test_declared_missing_value_counts_as_answered() {
    // An item registered with missing_value 0 contributes a numeric
    // input even when unanswered.
    let w = world();
    let patient = w.add_patient(Gender::Male, 1979, Some(date(2024, 1, 1)));

    let questionnaire = Questionnaire {
        id: QuestionnaireId::new(),
        name: "Symptom diary".to_string(),
    };
    let q_id = questionnaire.id;
    w.store.insert_questionnaire(questionnaire);

    let construct_id = ConstructScaleId::new();
    let mut item_ids = Vec::new();
    for number in 1..=2u32 {
        let item = Item {
            id: ItemId::new(),
            name: format!("symptom {number}"),
            response_type: ResponseType::Number,
            construct_scale_id: Some(construct_id),
            item_number: Some(number),
            likert_scale_id: None,
            range_scale_id: None,
            direction: Direction::LowerBetter,
            calibration: Calibration::default(),
            missing_value: Some(0.0),
        };
        item_ids.push(item.id);
        w.store.insert_item(item.clone());
        w.store.attach_item(q_id, item.id, number);
    }
    w.store
        .register_construct(ConstructScale {
            id: construct_id,
            name: "Symptom burden".to_string(),
            direction: Direction::LowerBetter,
            calibration: Calibration::default(),
            minimum_number_of_items: 2,
            equation: "sum({q1}, {q2})".to_string(),
        })
        .unwrap();

    let pq = w.assign(patient, q_id);
    let submission = w.submit(
        patient,
        pq,
        &item_ids,
        date(2024, 2, 1),
        &[Some("3"), None],
    );

    let row = w
        .engine
        .scores()
        .construct_score(submission, construct_id)
        .unwrap();
    assert_eq!(row.score, Some(3.0));
}
