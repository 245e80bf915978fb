use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callqi_config::TimelineSettings;
use callqi_db::models::{
    ChannelRoles, ConversationFlow, ConversationRule, GroupPosition, RuleGroup,
    SegmentWithSpeaker, SentenceGroup, Speaker,
};
use callqi_services::catalog::RuleGroupSetting;
use callqi_services::dialogue::FlowMachine;
use callqi_services::matching::criteria::{
    extract_tag_sets, flow_limits, flow_sequence, sentence_group_match, sentences_match,
};
use callqi_services::matching::{
    DispatchError, MatchedData, PredictError, PredictResult, PredictSentence, Predictor,
    TagMatcher,
};
use callqi_services::rules::ConversationPlan;
use callqi_services::timeline;
use tokio_util::sync::CancellationToken;

use crate::fixtures::asr::complaint_call;
use crate::fixtures::catalog::{catalog, predictor};
use crate::fixtures::predictor::{FailingPredictor, ScriptedPredictor, SlowPredictor};

/// The spoken segments of the complaint call, in timeline order.
fn complaint_texts() -> Vec<String> {
    [
        "hello thank you for calling",
        "my order is late",
        "please hold on",
        "ok",
        "goodbye",
        "bye",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

const ALL_TAGS: [u64; 5] = [100, 101, 200, 300, 400];

/// Never answers for the listed tags.
struct StallingPredictor {
    stalled: Vec<u64>,
    inner: ScriptedPredictor,
}

#[async_trait]
impl Predictor for StallingPredictor {
    async fn batch_predict(
        &self,
        tag_id: u64,
        threshold: i32,
        sentences: &[PredictSentence],
    ) -> Result<PredictResult, PredictError> {
        if self.stalled.contains(&tag_id) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.batch_predict(tag_id, threshold, sentences).await
    }
}

#[tokio::test]
async fn round_yields_one_entry_per_sentence() {
    let predictor = Arc::new(predictor());
    let matcher = TagMatcher::new(predictor.clone(), 3, 60);
    let data = matcher
        .tag_match(&ALL_TAGS, &complaint_texts(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(data.len(), 6);
    let indexes: Vec<usize> = data.iter().map(|d| d.index).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(predictor.calls(), ALL_TAGS.to_vec());

    let tag_sets = extract_tag_sets(&data);
    assert_eq!(tag_sets[0], BTreeSet::from([100, 101]));
    assert_eq!(tag_sets[1], BTreeSet::from([400]));
    assert_eq!(tag_sets[2], BTreeSet::from([300]));
    assert!(tag_sets[3].is_empty());
    assert_eq!(tag_sets[4], BTreeSet::from([200]));
    assert!(tag_sets[5].is_empty());

    let hit = data[1].get(400).unwrap();
    assert_eq!(hit.matched, "late");
    assert_eq!(hit.sentence_id, 2);
}

#[tokio::test]
async fn tag_hits_resolve_to_catalog_sentences() {
    let matcher = TagMatcher::new(Arc::new(predictor()), 5, 60);
    let data = matcher
        .tag_match(&ALL_TAGS, &complaint_texts(), Duration::from_secs(5))
        .await
        .unwrap();

    let criteria: HashMap<u64, Vec<u64>> = catalog()
        .sentences
        .iter()
        .map(|s| (s.id, s.tag_ids.clone()))
        .collect();
    let matched = sentences_match(&extract_tag_sets(&data), &criteria);
    assert_eq!(matched[&1], vec![1]);
    assert_eq!(matched[&2], vec![5]);
    assert_eq!(matched[&3], vec![3]);
    assert_eq!(matched[&4], vec![2]);
}

#[tokio::test]
async fn duplicate_tags_are_asked_once() {
    let predictor = Arc::new(predictor());
    let matcher = TagMatcher::new(predictor.clone(), 4, 60);
    matcher
        .tag_match(&[400, 100, 400, 100], &complaint_texts(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(predictor.calls(), vec![100, 400]);
}

#[tokio::test]
async fn deadline_keeps_answers_collected_so_far() {
    let stalling = StallingPredictor {
        stalled: vec![400],
        inner: predictor(),
    };
    let matcher = TagMatcher::new(Arc::new(stalling), 5, 60);
    let err = matcher
        .tag_match(&ALL_TAGS, &complaint_texts(), Duration::from_millis(500))
        .await
        .unwrap_err();

    let partial = match err {
        DispatchError::DeadlineExceeded(partial) => partial,
        other => panic!("unexpected error: {other:?}"),
    };
    assert_eq!(partial.len(), 6);
    assert_eq!(partial[0].tag_ids(), BTreeSet::from([100, 101]));
    assert!(partial[1].is_empty());
}

#[tokio::test]
async fn slow_predictor_misses_the_deadline_entirely() {
    let slow = SlowPredictor {
        delay: Duration::from_secs(5),
        inner: predictor(),
    };
    let matcher = TagMatcher::new(Arc::new(slow), 5, 60);
    let err = matcher
        .tag_match(&ALL_TAGS, &complaint_texts(), Duration::from_millis(200))
        .await
        .unwrap_err();
    let partial = err.partial().unwrap();
    assert_eq!(partial.len(), 6);
    assert!(partial.iter().all(|d| d.is_empty()));
}

#[tokio::test]
async fn caller_can_cancel_a_round() {
    let slow = SlowPredictor {
        delay: Duration::from_secs(5),
        inner: predictor(),
    };
    let matcher = TagMatcher::new(Arc::new(slow), 2, 60);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = matcher
        .tag_match_with_cancel(
            &ALL_TAGS,
            &complaint_texts(),
            Duration::from_secs(10),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Cancelled(ref partial) if partial.len() == 6));
}

#[tokio::test]
async fn failed_tag_stops_the_round() {
    let failing = Arc::new(FailingPredictor {
        failing: vec![200],
        inner: predictor(),
    });
    let matcher = TagMatcher::new(failing.clone(), 1, 60);
    let err = matcher
        .tag_match(&[100, 200, 400], &complaint_texts(), Duration::from_secs(5))
        .await
        .unwrap_err();

    let DispatchError::Predictor { tag, partial, .. } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(tag, 200);
    assert_eq!(partial.len(), 6);
    assert_eq!(partial[0].tag_ids(), BTreeSet::from([100]));
    // 400 is never asked once 200 fails
    assert_eq!(failing.inner.calls(), vec![100]);
}

#[tokio::test]
async fn empty_round_or_zero_timeout_is_rejected() {
    let matcher = TagMatcher::new(Arc::new(predictor()), 2, 60);
    let texts = complaint_texts();

    let err = matcher
        .tag_match(&[], &texts, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoArgument));

    let err = matcher
        .tag_match(&[100], &[], Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoArgument));

    let err = matcher
        .tag_match(&[100], &texts, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTimeout));
    assert!(err.partial().is_none());
}

/// Timeline of the complaint call and its tag-match round.
async fn complaint_round() -> (Vec<SegmentWithSpeaker>, Vec<MatchedData>) {
    let timeline = timeline::build_timeline(
        &complaint_call(501),
        ChannelRoles::default(),
        &TimelineSettings::default(),
    );
    let texts: Vec<String> = timeline::spoken(&timeline)
        .iter()
        .map(|s| s.segment.text.clone())
        .collect();
    let matched = TagMatcher::new(Arc::new(predictor()), 5, 60)
        .tag_match(&ALL_TAGS, &texts, Duration::from_secs(5))
        .await
        .unwrap();
    (timeline, matched)
}

fn group(id: u64, uuid: &str, sentence_id: u64, role: Option<Speaker>) -> SentenceGroup {
    SentenceGroup {
        id,
        uuid: uuid.to_string(),
        role,
        sentence_ids: vec![sentence_id],
        ..Default::default()
    }
}

fn group_hits(
    timeline: &[SegmentWithSpeaker],
    matched: &[MatchedData],
    groups: &[&SentenceGroup],
) -> HashMap<u64, Vec<usize>> {
    let criteria: HashMap<u64, Vec<u64>> = catalog()
        .sentences
        .iter()
        .map(|s| (s.id, s.tag_ids.clone()))
        .collect();
    let sentence_hits = sentences_match(&extract_tag_sets(matched), &criteria);
    sentence_group_match(&sentence_hits, groups, &timeline::spoken(timeline))
}

#[tokio::test]
async fn head_and_tail_windows_limit_where_groups_count() {
    let (timeline, matched) = complaint_round().await;
    let windowed = |mut g: SentenceGroup, position, range| {
        g.position = Some(position);
        g.range = range;
        g
    };
    let greet = windowed(group(10, "greet", 1, Some(Speaker::Staff)), GroupPosition::Head, 1);
    let bye = windowed(group(11, "bye", 2, Some(Speaker::Staff)), GroupPosition::Tail, 1);
    let hold_early = windowed(group(13, "hold", 3, None), GroupPosition::Head, 2);
    let hold_late = windowed(group(14, "hold", 3, None), GroupPosition::Tail, 3);

    let hits = group_hits(
        &timeline,
        &matched,
        &[&greet, &bye, &hold_early, &hold_late],
    );
    assert_eq!(hits[&10], vec![1]);
    assert_eq!(hits[&11], vec![5]);
    // hold is the third spoken segment
    assert!(!hits.contains_key(&13));
    assert_eq!(hits[&14], vec![3]);
}

#[tokio::test]
async fn group_range_bounds_distance_from_previous_clause() {
    let (timeline, matched) = complaint_round().await;
    let machine = FlowMachine::compile("must greet then hold").unwrap();
    let flow = ConversationFlow::default();
    let greet = group(10, "greet", 1, Some(Speaker::Staff));

    for (range, expected) in [(1, false), (2, true), (0, true)] {
        let hold = SentenceGroup {
            range,
            ..group(13, "hold", 3, Some(Speaker::Staff))
        };
        let groups = [&greet, &hold];
        let hits = group_hits(&timeline, &matched, &groups);
        let sequence = flow_sequence(&hits, &groups, 6);
        let accepted = machine.accepts_limited(&sequence, &flow_limits(&flow, &groups));
        assert_eq!(accepted, expected, "range {range}");
    }
}

#[tokio::test]
async fn negated_group_fails_the_flow_once_met() {
    let (timeline, matched) = complaint_round().await;
    let machine = FlowMachine::compile("must greet then not complaint then bye").unwrap();
    let greet = group(10, "greet", 1, Some(Speaker::Staff));
    let bye = group(11, "bye", 2, Some(Speaker::Staff));

    let by_customer = group(12, "complaint", 4, Some(Speaker::Customer));
    let groups = [&greet, &by_customer, &bye];
    let sequence = flow_sequence(&group_hits(&timeline, &matched, &groups), &groups, 6);
    assert!(!machine.accepts_groups(&sequence));

    // staff never complains, so the negation holds
    let by_staff = group(12, "complaint", 4, Some(Speaker::Staff));
    let groups = [&greet, &by_staff, &bye];
    let sequence = flow_sequence(&group_hits(&timeline, &matched, &groups), &groups, 6);
    assert!(machine.accepts_groups(&sequence));
}

#[tokio::test]
async fn repeated_flow_needs_every_round() {
    let (timeline, matched) = complaint_round().await;
    let spoken = timeline::spoken(&timeline);
    let setting = |repeat| RuleGroupSetting {
        group: RuleGroup {
            id: 7,
            rule_ids: vec![70],
            ..Default::default()
        },
        rules: vec![ConversationRule {
            id: 70,
            score: 4,
            min: 1,
            flow_ids: vec![71],
            ..Default::default()
        }],
        flows: vec![ConversationFlow {
            id: 71,
            expression: "must greet".to_string(),
            sentence_group_ids: vec![10],
            repeat,
            ..Default::default()
        }],
        sentence_groups: vec![group(10, "greet", 1, Some(Speaker::Staff))],
        sentences: catalog().sentences,
        ..Default::default()
    };

    let once = ConversationPlan::compile(setting(1)).unwrap();
    let credit = once.evaluate(&spoken, &matched).unwrap();
    assert!(credit.rules[0].valid);
    assert_eq!(credit.score, 4);

    // the greeting is said once only
    let twice = ConversationPlan::compile(setting(2)).unwrap();
    let credit = twice.evaluate(&spoken, &matched).unwrap();
    assert!(!credit.rules[0].flows[0].valid);
    assert_eq!(credit.score, 0);
}
