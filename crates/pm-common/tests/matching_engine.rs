use pm_common::matching::{AssessmentAnswer, RankedMatch};
use pm_common::{EngineError, InMemoryStore, MatchingConfig, MatchingEngine, MatchingStore};

const LANG: i64 = 1;
const SOFT: i64 = 2;
const JAVA: i64 = 10;
const SQL: i64 = 11;
const TEAMWORK: i64 = 20;

/// Students 1..=3, three skills in two groups, and a handful of internships:
/// 100 weighs Java/SQL 70/30, 200 splits 40/60 across groups, 300 has no
/// criteria and 400 is inactive.
fn engine() -> MatchingEngine<InMemoryStore> {
    let store = InMemoryStore::new();
    store
        .add_student(1)
        .add_student(2)
        .add_student(3)
        .add_skill(JAVA, LANG)
        .add_skill(SQL, LANG)
        .add_skill(TEAMWORK, SOFT)
        .add_internship(100, true)
        .set_group_weight(100, LANG, 100)
        .set_skill_weight(100, JAVA, 70)
        .set_skill_weight(100, SQL, 30)
        .add_internship(200, true)
        .set_group_weight(200, LANG, 40)
        .set_group_weight(200, SOFT, 60)
        .set_skill_weight(200, JAVA, 100)
        .set_skill_weight(200, TEAMWORK, 100)
        .add_internship(300, true)
        .add_internship(400, false)
        .set_group_weight(400, LANG, 100)
        .set_skill_weight(400, JAVA, 100);
    MatchingEngine::new(store, MatchingConfig::default())
}

fn answers(values: &[(i64, i32)]) -> Vec<AssessmentAnswer> {
    values
        .iter()
        .enumerate()
        .map(|(idx, &(skill_id, value))| AssessmentAnswer::new(skill_id, idx as i64 + 1, value))
        .collect()
}

#[tokio::test]
async fn submission_is_aggregated_per_skill() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 4), (JAVA, 5), (SQL, 3), (SQL, 5), (SQL, 4)]))
        .await
        .unwrap();

    let scores = engine.store().load_skill_scores(1).await.unwrap();
    assert_eq!(scores.get(JAVA), Some(4.5));
    assert_eq!(scores.get(SQL), Some(4.0));
    assert_eq!(scores.get(TEAMWORK), None);
}

#[tokio::test]
async fn resubmission_replaces_previous_scores() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 1), (SQL, 1)]))
        .await
        .unwrap();
    engine.aggregate_scores(1, &answers(&[(JAVA, 5)])).await.unwrap();

    let scores = engine.store().load_skill_scores(1).await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores.get(JAVA), Some(5.0));
}

#[tokio::test]
async fn invalid_answer_stores_nothing() {
    let engine = engine();
    engine.aggregate_scores(1, &answers(&[(JAVA, 3)])).await.unwrap();

    let err = engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (SQL, 6)]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAnswerValue { value: 6, .. }));
    assert_eq!(
        engine.store().load_skill_scores(1).await.unwrap().get(JAVA),
        Some(3.0)
    );
}

#[tokio::test]
async fn group_shares_become_effective_weights() {
    let engine = engine();
    let weights = engine.resolve_weights(200).await.unwrap();

    assert!((weights.get(JAVA) - 0.40).abs() < 1e-9);
    assert!((weights.get(TEAMWORK) - 0.60).abs() < 1e-9);
    assert!((weights.total() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn internship_without_criteria_scores_zero() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (SQL, 5), (TEAMWORK, 5)]))
        .await
        .unwrap();

    assert!(engine.resolve_weights(300).await.unwrap().is_empty());
    assert_eq!(engine.score(1, 300).await.unwrap(), 0.0);
    assert_eq!(engine.score(1, 100).await.unwrap(), 100.0);
}

#[tokio::test]
async fn half_hundredth_scores_round_up() {
    let store = InMemoryStore::new();
    store
        .add_student(1)
        .add_skill(JAVA, LANG)
        .add_internship(5, true)
        .set_group_weight(5, LANG, 10)
        .set_group_weight(5, SOFT, 70)
        .set_skill_weight(5, JAVA, 100);
    let engine = MatchingEngine::new(store, MatchingConfig::default());

    // Mean 1.25 on a 1/8 share: 3.125 exactly.
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 1), (JAVA, 1), (JAVA, 1), (JAVA, 2)]))
        .await
        .unwrap();

    assert_eq!(engine.score(1, 5).await.unwrap(), 3.13);
}

#[tokio::test]
async fn end_to_end_score() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (JAVA, 5), (SQL, 3)]))
        .await
        .unwrap();

    assert_eq!(engine.score(1, 100).await.unwrap(), 88.0);

    let breakdown = engine.score_breakdown(1, 100).await.unwrap();
    assert_eq!(breakdown.total, 88.0);
    assert_eq!(breakdown.skills.len(), 2);
}

#[tokio::test]
async fn scores_stay_within_bounds() {
    let engine = engine();
    engine
        .aggregate_scores(2, &answers(&[(JAVA, 1), (SQL, 1), (TEAMWORK, 1)]))
        .await
        .unwrap();

    for internship_id in [100, 200, 300, 400] {
        let score = engine.score(2, internship_id).await.unwrap();
        assert!((0.0..=100.0).contains(&score), "{internship_id}: {score}");
    }
}

#[tokio::test]
async fn unknown_ids_are_reported() {
    let engine = engine();

    assert!(matches!(
        engine.score(99, 100).await,
        Err(EngineError::StudentNotFound(99))
    ));
    assert!(matches!(
        engine.score(1, 999).await,
        Err(EngineError::InternshipNotFound(999))
    ));
    assert!(matches!(
        engine.aggregate_scores(99, &answers(&[(JAVA, 3)])).await,
        Err(EngineError::StudentNotFound(99))
    ));
}

#[tokio::test]
async fn equal_scores_rank_by_ascending_internship_id() {
    let store = InMemoryStore::new();
    store.add_student(1).add_skill(JAVA, LANG);
    for id in [9, 4, 6] {
        store
            .add_internship(id, true)
            .set_group_weight(id, LANG, 100)
            .set_skill_weight(id, JAVA, 100);
    }
    let engine = MatchingEngine::new(store, MatchingConfig::default());

    // Averages to 3.60.
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 4), (JAVA, 4), (JAVA, 4), (JAVA, 3), (JAVA, 3)]))
        .await
        .unwrap();

    let ranked = engine.rank_matches(1, 3).await.unwrap();
    assert_eq!(
        ranked,
        vec![
            RankedMatch { internship_id: 4, score: 72.0 },
            RankedMatch { internship_id: 6, score: 72.0 },
            RankedMatch { internship_id: 9, score: 72.0 },
        ]
    );
}

#[tokio::test]
async fn top_k_is_bounded_by_active_internships() {
    let store = InMemoryStore::new();
    store
        .add_student(1)
        .add_skill(JAVA, LANG)
        .add_internship(5, true)
        .add_internship(6, false);
    let engine = MatchingEngine::new(store, MatchingConfig::default());

    let ranked = engine.rank_matches(1, 3).await.unwrap();
    assert_eq!(ranked, vec![RankedMatch { internship_id: 5, score: 0.0 }]);
}

#[tokio::test]
async fn ranking_skips_inactive_internships() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (SQL, 2), (TEAMWORK, 1)]))
        .await
        .unwrap();

    let ranked = engine.rank_matches(1, 3).await.unwrap();
    let ids: Vec<_> = ranked.iter().map(|m| m.internship_id).collect();
    assert_eq!(ids, vec![100, 200, 300]);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn persisting_the_same_ranking_twice_is_idempotent() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (SQL, 3), (TEAMWORK, 4)]))
        .await
        .unwrap();
    let ranked = engine.rank_matches(1, 3).await.unwrap();
    assert_eq!(ranked.len(), 3);

    engine.persist_matches(1, &ranked).await.unwrap();
    let after_first = engine.store().load_matches(1).await.unwrap();

    engine.persist_matches(1, &ranked).await.unwrap();
    let after_second = engine.store().load_matches(1).await.unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.len(), 3);
    assert_eq!(
        after_second.iter().map(|m| m.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    for (stored, expected) in after_second.iter().zip(&ranked) {
        assert_eq!(stored.student_id, 1);
        assert_eq!(stored.internship_id, expected.internship_id);
        assert_eq!(stored.score, expected.score);
    }
}

#[tokio::test]
async fn recomputing_twice_keeps_one_ranking() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (SQL, 3), (TEAMWORK, 4)]))
        .await
        .unwrap();

    let first = engine.recompute_student(1).await.unwrap();
    let second = engine.recompute_student(1).await.unwrap();
    assert_eq!(first, second);

    let stored = engine.store().load_matches(1).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.iter().map(|m| m.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(
        stored.iter().map(|m| m.internship_id).collect::<Vec<_>>(),
        first.iter().map(|m| m.internship_id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn failed_persist_keeps_previous_ranking() {
    let engine = engine();
    engine.aggregate_scores(1, &answers(&[(JAVA, 5)])).await.unwrap();
    let before = engine.recompute_student(1).await.unwrap();

    engine.store().reject_match_writes(1, true);
    engine.aggregate_scores(1, &answers(&[(SQL, 5)])).await.unwrap();
    let err = engine.recompute_student(1).await.unwrap_err();
    assert!(matches!(err, EngineError::PersistenceFailure { student_id: 1, .. }));

    let stored = engine.store().load_matches(1).await.unwrap();
    assert_eq!(
        stored.iter().map(|m| m.internship_id).collect::<Vec<_>>(),
        before.iter().map(|m| m.internship_id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn persist_rejects_malformed_rankings() {
    let engine = engine();
    let duplicate = [
        RankedMatch { internship_id: 100, score: 50.0 },
        RankedMatch { internship_id: 100, score: 40.0 },
    ];
    assert!(matches!(
        engine.persist_matches(1, &duplicate).await,
        Err(EngineError::InvalidRanking(_))
    ));

    let too_many: Vec<_> = [100, 200, 300, 400]
        .into_iter()
        .map(|internship_id| RankedMatch { internship_id, score: 10.0 })
        .collect();
    assert!(matches!(
        engine.persist_matches(1, &too_many).await,
        Err(EngineError::InvalidRanking(_))
    ));

    assert!(engine.store().load_matches(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn stored_matches_require_a_known_student() {
    let engine = engine();

    assert!(matches!(
        engine.stored_matches(99).await,
        Err(EngineError::StudentNotFound(99))
    ));
    assert!(engine.stored_matches(1).await.unwrap().is_empty());

    engine.aggregate_scores(1, &answers(&[(JAVA, 4)])).await.unwrap();
    engine.recompute_student(1).await.unwrap();
    assert_eq!(engine.stored_matches(1).await.unwrap().len(), 3);
}

#[tokio::test]
async fn sweep_reports_failing_students_and_continues() {
    let engine = engine();
    for student_id in [1, 2, 3] {
        engine
            .aggregate_scores(student_id, &answers(&[(JAVA, 4), (SQL, 4)]))
            .await
            .unwrap();
    }
    engine.store().reject_match_writes(2, true);

    let report = engine.recompute_all().await.unwrap();
    assert_eq!(report.succeeded, vec![1, 3]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].student_id, 2);
    assert_eq!(report.internships_considered, 3);
    assert!(!report.is_clean());

    assert_eq!(engine.store().load_matches(3).await.unwrap().len(), 3);
    assert!(engine.store().load_matches(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_recomputes_leave_a_single_ranking() {
    let engine = engine();
    engine
        .aggregate_scores(1, &answers(&[(JAVA, 5), (TEAMWORK, 2)]))
        .await
        .unwrap();

    let (a, b) = tokio::join!(engine.recompute_student(1), engine.recompute_student(1));
    assert_eq!(a.unwrap(), b.unwrap());

    let stored = engine.store().load_matches(1).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.iter().map(|m| m.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
}
