//! Integration tests for caching, invalidation, and degradation as
//! observed through the engine API.

mod common;

use common::*;
use chrono::Utc;
use promcore::cache::FailingCache;
use promcore::cohort::{AggregateTarget, AggregationKind};
use promcore::domain::*;
use promcore::engine::{AnalyticsEngine, Deadline};
use promcore::intervals::{AnchorKind, FilterContext, Granularity};
use promcore::scores::ConstructScore;
use promcore::store::{CohortPredicates, ResponseStore};
use std::sync::Arc;

fn weekly() -> FilterContext {
    FilterContext::new(AnchorKind::Registration, Granularity::Week)
}

/// Overwrite a derived row directly, bypassing invalidation. A cached
/// review must keep serving the old value until the patient namespace
/// is flushed.
fn sneak_in_score(w: &World, submission: SubmissionId, construct: ConstructScaleId, score: f64) {
    w.engine.scores().upsert_construct_score(ConstructScore {
        submission_id: submission,
        construct_id: construct,
        score: Some(score),
        computed_at: Utc::now(),
    });
}

#[test]
fn test_patient_namespace_isolation() {
    let w = world();
    let (q_id, construct_id, items) = w.likert_construct(
        "Mood",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );

    let p1 = w.add_patient(Gender::Female, 1980, Some(date(2024, 1, 1)));
    let p2 = w.add_patient(Gender::Male, 1981, Some(date(2024, 1, 1)));
    let pq1 = w.assign(p1, q_id);
    let pq2 = w.assign(p2, q_id);
    let s1 = w.submit(p1, pq1, &items, date(2024, 1, 8), &[Some("2"), Some("2")]);
    let s2 = w.submit(p2, pq2, &items, date(2024, 1, 8), &[Some("3"), Some("3")]);

    let ctx = weekly();
    // Prime both patients' caches.
    let r1 = w
        .engine
        .get_patient_review(w.institution, p1, &ctx, Deadline::none())
        .unwrap();
    let r2 = w
        .engine
        .get_patient_review(w.institution, p2, &ctx, Deadline::none())
        .unwrap();
    assert_eq!(r1.construct_scores[0].current, Some(2.0));
    assert_eq!(r2.construct_scores[0].current, Some(3.0));

    // Mutate both patients' rows behind the cache's back.
    sneak_in_score(&w, s1, construct_id, 5.0);
    sneak_in_score(&w, s2, construct_id, 5.0);

    // Invalidate only p1. The write hook re-runs scoring (clobbering
    // the sneaked row), so sneak it back in afterwards.
    w.engine.on_submission_written(s1).unwrap();
    sneak_in_score(&w, s1, construct_id, 5.0);

    let r1 = w
        .engine
        .get_patient_review(w.institution, p1, &ctx, Deadline::none())
        .unwrap();
    let r2 = w
        .engine
        .get_patient_review(w.institution, p2, &ctx, Deadline::none())
        .unwrap();
    // p1 sees the fresh row, p2 still serves its cached result.
    assert_eq!(r1.construct_scores[0].current, Some(5.0));
    assert_eq!(r2.construct_scores[0].current, Some(3.0));
}

#[test]
fn test_write_acknowledgment_makes_reads_fresh() {
    let w = world();
    let (q_id, _construct_id, items) = w.likert_construct(
        "Coping",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let patient = w.add_patient(Gender::Female, 1985, Some(date(2024, 1, 1)));
    let pq = w.assign(patient, q_id);
    let submission = w.submit(patient, pq, &items, date(2024, 1, 8), &[Some("2"), Some("2")]);

    let ctx = weekly();
    let review = w
        .engine
        .get_patient_review(w.institution, patient, &ctx, Deadline::none())
        .unwrap();
    assert_eq!(review.construct_scores[0].current, Some(2.0));

    // Amend a response; the write hook both rescores and invalidates.
    w.store
        .insert_response(ItemResponse {
            submission_id: submission,
            item_id: items[0],
            response_value: "4".to_string(),
        })
        .unwrap();
    w.engine.on_submission_written(submission).unwrap();

    let review = w
        .engine
        .get_patient_review(w.institution, patient, &ctx, Deadline::none())
        .unwrap();
    assert_eq!(review.construct_scores[0].current, Some(3.0));
}

#[test]
fn test_population_aggregate_invalidated_by_any_write() {
    let w = world();
    let (q_id, construct_id, items) = w.likert_construct(
        "Stamina",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let index = w.add_patient(Gender::Female, 1980, Some(date(2024, 1, 1)));
    let pq = w.assign(index, q_id);
    w.submit(index, pq, &items, date(2024, 1, 1), &[Some("3"), Some("3")]);

    let member = w.add_patient(Gender::Female, 1982, Some(date(2024, 1, 1)));
    let member_pq = w.assign(member, q_id);
    w.submit(member, member_pq, &items, date(2024, 1, 1), &[Some("2"), Some("2")]);

    let ctx = weekly();
    let stats = w
        .engine
        .get_cohort_aggregate(
            w.institution,
            AggregateTarget::Construct(construct_id),
            &ctx,
            &CohortPredicates::default(),
            Some(AggregationKind::MedianIqr),
            index,
            Deadline::none(),
        )
        .unwrap();
    assert_eq!(stats[0].n, 1);

    // A second cohort member lands; its write flushes `agg:*`.
    let late = w.add_patient(Gender::Female, 1979, Some(date(2024, 1, 1)));
    let late_pq = w.assign(late, q_id);
    w.submit(late, late_pq, &items, date(2024, 1, 1), &[Some("4"), Some("4")]);

    let stats = w
        .engine
        .get_cohort_aggregate(
            w.institution,
            AggregateTarget::Construct(construct_id),
            &ctx,
            &CohortPredicates::default(),
            Some(AggregationKind::MedianIqr),
            index,
            Deadline::none(),
        )
        .unwrap();
    assert_eq!(stats[0].n, 2);
    assert_eq!(stats[0].center, Some(3.0));
}

#[test]
fn test_cache_backend_failure_degrades_to_computation() {
    let store = Arc::new(promcore::store::MemoryStore::new());
    let institution = InstitutionId::new();
    store.insert_institution(Institution {
        id: institution,
        name: "General Hospital".to_string(),
    });
    let engine = AnalyticsEngine::new(
        Arc::clone(&store) as Arc<dyn ResponseStore>,
        Arc::new(FailingCache),
        promcore::CoreConfig::default(),
    );
    let w = World {
        store,
        engine,
        institution,
    };

    let (q_id, _c, items) = w.likert_construct(
        "Resilience",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let patient = w.add_patient(Gender::Male, 1970, Some(date(2024, 1, 1)));
    let pq = w.assign(patient, q_id);
    w.submit(patient, pq, &items, date(2024, 1, 8), &[Some("4"), Some("2")]);

    // Every read recomputes, none fails.
    for _ in 0..3 {
        let review = w
            .engine
            .get_patient_review(w.institution, patient, &weekly(), Deadline::none())
            .unwrap();
        assert_eq!(review.construct_scores[0].current, Some(3.0));
    }
}

#[test]
fn test_distinct_filter_contexts_cache_separately() {
    let w = world();
    let (q_id, _c, items) = w.likert_construct(
        "Focus",
        2,
        1,
        Direction::HigherBetter,
        Calibration::default(),
        "mean({q1}, {q2})",
    );
    let patient = w.add_patient(Gender::Female, 1995, Some(date(2024, 1, 1)));
    let pq = w.assign(patient, q_id);
    w.submit(patient, pq, &items, date(2024, 3, 1), &[Some("4"), Some("4")]);

    let weekly_review = w
        .engine
        .get_patient_review(w.institution, patient, &weekly(), Deadline::none())
        .unwrap();
    let monthly_ctx = FilterContext::new(AnchorKind::Registration, Granularity::Month);
    let monthly_review = w
        .engine
        .get_patient_review(w.institution, patient, &monthly_ctx, Deadline::none())
        .unwrap();

    // Same scores, different bucket indices: the contexts must not
    // collide in cache.
    assert_eq!(weekly_review.construct_scores[0].series[0].t, 8);
    assert_eq!(monthly_review.construct_scores[0].series[0].t, 2);
}
