use std::sync::Arc;
use std::time::Duration;

use callqi_config::ScoringSettings;
use callqi_db::{CreditValid, LevelType, Whos};
use callqi_services::ScoringError;
use callqi_services::catalog::LookupError;
use callqi_services::credit::CreditError;
use callqi_services::matching::DispatchError;
use callqi_services::rules::RuleError;

use crate::fixtures::asr::{complaint_call, quiet_call};
use crate::fixtures::catalog::predictor;
use crate::fixtures::predictor::{FailingPredictor, SlowPredictor};
use crate::fixtures::test_engine::TestEngine;

#[tokio::test]
async fn scores_call_against_every_rule_family() {
    let predictor = Arc::new(predictor());
    let app = TestEngine::new(predictor.clone());

    let scored = app
        .engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap();

    // 100 base + greet/bye 10 - complaint 5 - long silence 2 + speed 5
    assert_eq!(scored.score, 108);
    // every tag asked once, exception tags included
    assert_eq!(predictor.calls(), vec![100, 101, 200, 300, 400]);

    let group = &scored.rule_groups[0];
    assert_eq!(group.score, 5);
    assert!(group.rules[0].valid);
    assert!(!group.rules[1].valid);

    let silence_held = &scored.exceptions[0];
    assert_eq!(silence_held.rule_id, 40);
    assert!(silence_held.valid);
    assert_eq!(silence_held.score, 0);
    assert_eq!(silence_held.silence_segs, vec![8]);
    let hold = &silence_held.exceptions[0];
    assert!(hold.valid);
    assert_eq!(hold.tags[0].tag_id, 300);
    assert_eq!(hold.tags[0].segment_id, 5);

    let silence_broken = &scored.exceptions[1];
    assert!(!silence_broken.valid);
    assert_eq!(silence_broken.score, -2);
    assert_eq!(silence_broken.silence_segs, vec![8, 4]);

    assert_eq!(scored.exceptions[2].whos, Whos::Speed);
    assert_eq!(scored.exceptions[2].score, 5);
    assert_eq!(scored.exceptions[3].whos, Whos::Interposal);
    assert!(scored.exceptions[3].valid);
    assert!(scored.exceptions[3].interposal_segs.is_empty());
}

#[tokio::test]
async fn stored_run_reads_back_as_one_tree() {
    let app = TestEngine::new(Arc::new(predictor()));
    let scored = app
        .engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap();

    let history = app.engine.retrieve_credit(501).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].create_time, scored.create_time);
    assert_eq!(history[0].score(), 108);
    assert_eq!(
        history[0].find(LevelType::RuleGroup, 1).unwrap().credit.score,
        8
    );
    assert_eq!(scored.credit_ids.len(), history[0].nodes().len());

    // greeting said on segment 1, evidenced by both of its tags
    let greet = history[0].find(LevelType::Sentence, 1).unwrap();
    assert_eq!(greet.credit.valid, CreditValid::Matched);
    let segment = &greet.children[0];
    assert_eq!(segment.credit.org_id, 1);
    let tags: Vec<u64> = segment.matches.iter().map(|m| m.tag_id).collect();
    assert_eq!(tags, vec![100, 101]);

    let broken = history[0].find(LevelType::SilenceRule, 41).unwrap();
    let segs: Vec<u64> = broken.children.iter().map(|c| c.credit.org_id).collect();
    assert_eq!(segs, vec![8, 4]);
    assert!(
        broken
            .children
            .iter()
            .all(|c| c.credit.level == LevelType::SilenceSegment)
    );

    let hold = history[0]
        .find(LevelType::BeforeStaffSentence, 3)
        .unwrap();
    assert_eq!(hold.credit.valid, CreditValid::Matched);
    assert_eq!(hold.children[0].credit.org_id, 5);
    assert_eq!(hold.children[0].matches[0].whos, Whos::Silence);
}

#[tokio::test]
async fn rescoring_adds_a_newer_history_bucket() {
    let app = TestEngine::new(Arc::new(predictor()));
    app.engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap();

    let history = app.engine.retrieve_credit(501).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].create_time > history[1].create_time);
    assert_eq!(history[0].score(), history[1].score());
}

#[tokio::test]
async fn back_to_back_runs_keep_separate_buckets() {
    let app = TestEngine::new(Arc::new(predictor()));
    let mut stamps = Vec::new();
    for _ in 0..3 {
        let scored = app
            .engine
            .score_call(TestEngine::request(quiet_call(502)))
            .await
            .unwrap();
        stamps.push(scored.create_time);
    }
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));

    let history = app.engine.retrieve_credit(502).await.unwrap();
    assert_eq!(history.len(), 3);
    for bucket in &history {
        assert_eq!(bucket.score(), 105);
        assert!(bucket.call().is_some());
    }
}

#[tokio::test]
async fn concurrent_scoring_of_one_call_is_rejected() {
    let slow = SlowPredictor {
        delay: Duration::from_millis(300),
        inner: predictor(),
    };
    let app = TestEngine::new(Arc::new(slow));

    let engine = app.engine.clone();
    let first = tokio::spawn(async move {
        engine
            .score_call(TestEngine::request(complaint_call(501)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(app.engine.is_scoring(501));

    let err = app
        .engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::AlreadyScoring(501)));

    // another call is not blocked
    app.engine
        .score_call(TestEngine::request(quiet_call(502)))
        .await
        .unwrap();

    first.await.unwrap().unwrap();
    assert!(!app.engine.is_scoring(501));
}

#[tokio::test]
async fn deadline_fails_the_run_and_stores_nothing() {
    let slow = SlowPredictor {
        delay: Duration::from_secs(5),
        inner: predictor(),
    };
    let scoring = ScoringSettings {
        timeout_secs: 1,
        ..Default::default()
    };
    let app = TestEngine::with_scoring(Arc::new(slow), scoring);

    let err = app
        .engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap_err();
    match err {
        ScoringError::Dispatch(DispatchError::DeadlineExceeded(partial)) => {
            assert_eq!(partial.len(), 6);
            assert!(partial.iter().all(|m| m.is_empty()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(app.store.all_credits().is_empty());
    assert!(!app.engine.is_scoring(501));
}

#[tokio::test]
async fn failed_tag_fails_the_run_and_stores_nothing() {
    let failing = FailingPredictor {
        failing: vec![300],
        inner: predictor(),
    };
    let app = TestEngine::new(Arc::new(failing));

    let err = app
        .engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScoringError::Dispatch(DispatchError::Predictor { tag: 300, .. })
    ));
    assert!(app.store.all_credits().is_empty());
    assert!(app.store.all_matches().is_empty());
    assert!(!app.engine.is_scoring(501));
}

#[tokio::test]
async fn unknown_rule_group_is_a_lookup_error() {
    let app = TestEngine::new(Arc::new(predictor()));
    let mut request = TestEngine::request(complaint_call(501));
    request.rule_group_ids = vec![9];

    let err = app.engine.score_call(request).await.unwrap_err();
    assert!(matches!(
        err,
        ScoringError::Lookup(LookupError::RuleGroupNotFound(9))
    ));
}

#[tokio::test]
async fn broken_expression_is_rejected_before_matching() {
    let predictor = Arc::new(predictor());
    let app = TestEngine::new(predictor.clone());
    let mut request = TestEngine::request(complaint_call(501));
    request.rule_group_ids = vec![2];

    let err = app.engine.score_call(request).await.unwrap_err();
    assert!(matches!(
        err,
        ScoringError::Rule(RuleError::Expression { flow_id: 22, .. })
    ));
    assert!(predictor.calls().is_empty());
    assert!(app.store.all_credits().is_empty());
}

#[tokio::test]
async fn call_group_reconciles_member_calls() {
    let app = TestEngine::new(Arc::new(predictor()));
    let first = app
        .engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap();
    let second = app
        .engine
        .score_call(TestEngine::request(quiet_call(502)))
        .await
        .unwrap();
    assert_eq!(first.score, 108);
    assert_eq!(second.score, 105);

    app.store.set_group(900, vec![501, 502]);
    let grouped = app.engine.score_call_group(900, &[1]).await.unwrap();
    // greet/bye held on 501, complaint on 501, silence held on 502, speed on both
    assert_eq!(grouped.score, 110);

    let history = app.engine.retrieve_grouped_credit(900).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].score(), 110);
    let greet_bye = history[0].find(LevelType::Rule, 30).unwrap();
    assert_eq!(greet_bye.credit.valid, CreditValid::Matched);
    assert_eq!(greet_bye.credit.call_id, 501);
    let complaint = history[0].find(LevelType::Rule, 31).unwrap();
    assert_eq!(complaint.credit.valid, CreditValid::NotMatched);
    assert_eq!(complaint.credit.score, -5);
    let silence = history[0].find(LevelType::SilenceRule, 41).unwrap();
    assert_eq!(silence.credit.valid, CreditValid::Matched);
    assert_eq!(silence.credit.call_id, 502);
}

#[tokio::test]
async fn single_member_group_reports_the_call() {
    let app = TestEngine::new(Arc::new(predictor()));
    app.engine
        .score_call(TestEngine::request(complaint_call(501)))
        .await
        .unwrap();
    app.store.set_group(901, vec![501]);

    let history = app.engine.retrieve_grouped_credit(901).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].score(), 108);
    assert!(history[0].find(LevelType::Sentence, 1).is_some());
}

#[tokio::test]
async fn group_without_members_is_an_error() {
    let app = TestEngine::new(Arc::new(predictor()));
    let err = app.engine.retrieve_grouped_credit(902).await.unwrap_err();
    assert!(matches!(
        err,
        ScoringError::Credit(CreditError::NoMemberCalls(902))
    ));

    app.store.set_group(903, Vec::new());
    let err = app.engine.score_call_group(903, &[1]).await.unwrap_err();
    assert!(matches!(
        err,
        ScoringError::Credit(CreditError::NoMemberCalls(903))
    ));
}
