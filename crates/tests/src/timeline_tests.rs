use callqi_config::TimelineSettings;
use callqi_db::models::{AsrResponse, Channel, ChannelRoles, EmotionKind, Speaker};
use callqi_services::timeline::{build_timeline, merge_channels, spoken};

use crate::fixtures::asr::{channel, complaint_call, response};

fn kinds(asr: &AsrResponse) -> Vec<(u64, Speaker, f64, f64)> {
    build_timeline(asr, ChannelRoles::default(), &TimelineSettings::default())
        .into_iter()
        .map(|s| (s.id(), s.speaker, s.segment.start, s.segment.end))
        .collect()
}

#[test]
fn lone_sentence_needs_no_gap_fill() {
    let asr = response(1, channel(&[(1.0, 2.0, "hello")], 4.0), channel(&[], 0.0));
    let timeline = kinds(&asr);
    assert_eq!(timeline.len(), 1);
    let (id, speaker, start, end) = timeline[0];
    assert_eq!(id, 1);
    assert_eq!(speaker, Speaker::Staff);
    assert!((start - 1.0).abs() < 0.001);
    assert!((end - 2.0).abs() < 0.001);
}

#[test]
fn overlapping_channels_merge_into_two_segments() {
    let left = channel(&[(0.0, 2.0, "good"), (2.0, 3.0, "morning")], 4.0);
    let right = channel(&[(2.0, 4.0, "hi")], 3.0);

    let merged = merge_channels(
        1,
        &left.sentences,
        &right.sentences,
        &TimelineSettings::default(),
    );
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].text, "good morning");
    assert!((merged[0].end - 3.0).abs() < 0.001);
    assert_eq!(merged[1].channel, Channel::Right);

    // one talk-over covering 2..3, and no silence
    let timeline = kinds(&response(1, left, right));
    let speakers: Vec<Speaker> = timeline.iter().map(|t| t.1).collect();
    assert_eq!(
        speakers,
        vec![Speaker::Staff, Speaker::Interposal, Speaker::Customer]
    );
    assert!((timeline[1].2 - 2.0).abs() < 0.001);
    assert!((timeline[1].3 - 3.0).abs() < 0.001);
}

#[test]
fn complaint_call_timeline_layout() {
    let timeline = kinds(&complaint_call(501));
    use Speaker::*;
    let expected = [
        (Staff, 0.0, 2.0),
        (Silence, 2.0, 3.0),
        (Customer, 3.0, 5.0),
        (Silence, 5.0, 10.0),
        (Staff, 10.0, 12.0),
        (Silence, 12.0, 13.0),
        (Customer, 13.0, 14.0),
        (Silence, 14.0, 30.0),
        (Staff, 30.0, 32.0),
        (Customer, 32.5, 33.0),
    ];
    assert_eq!(timeline.len(), expected.len());
    for (idx, ((id, speaker, start, end), (want, want_start, want_end))) in
        timeline.iter().zip(expected).enumerate()
    {
        assert_eq!(*id, idx as u64 + 1);
        assert_eq!(*speaker, want, "segment {id}");
        assert!((start - want_start).abs() < 0.001);
        assert!((end - want_end).abs() < 0.001);
    }
}

#[test]
fn starts_never_decrease_with_staff_on_the_right() {
    let asr = response(
        9,
        channel(
            &[(0.5, 3.0, "a"), (3.5, 6.0, "b"), (20.0, 22.0, "c")],
            4.0,
        ),
        channel(&[(1.0, 1.5, "d"), (5.0, 9.0, "e"), (21.0, 25.0, "f")], 3.0),
    );
    let timeline = build_timeline(
        &asr,
        ChannelRoles::staff_on(Channel::Right),
        &TimelineSettings::default(),
    );
    assert!(
        timeline
            .windows(2)
            .all(|w| w[0].segment.start <= w[1].segment.start)
    );
    assert!(timeline.iter().all(|s| s.segment.call_id == 9));

    let parties = spoken(&timeline);
    assert_eq!(parties.len(), 5);
    assert_eq!(parties[0].speaker, Speaker::Customer);
    assert_eq!(parties[0].segment.text, "a b");
    assert_eq!(parties[1].speaker, Speaker::Staff);
}

#[test]
fn asr_document_parses_and_failed_sentences_stay_apart() {
    let raw = r#"{
        "version": 1.0,
        "ret": 0,
        "call_id": 88,
        "length": 12.0,
        "left_channel": {
            "speed": 4.2,
            "sentences": [
                {"sret": 200, "start": 0.0, "end": 1.0, "asr": "hello", "emotion": 10.0},
                {"sret": 500, "start": 1.2, "end": 1.5},
                {"sret": 200, "start": 1.6, "end": 2.4, "asr": "there", "emotion": 40.0},
                {"sret": 200, "start": 2.5, "end": 3.0, "asr": "friend", "emotion": 20.0}
            ]
        },
        "right_channel": {"speed": 3.1, "sentences": []}
    }"#;
    let asr: AsrResponse = serde_json::from_str(raw).unwrap();
    assert_eq!(asr.call_id, 88);
    assert!((asr.left_channel.speed - 4.2).abs() < 0.001);

    let timeline = build_timeline(&asr, ChannelRoles::default(), &TimelineSettings::default());
    let texts: Vec<&str> = timeline.iter().map(|s| s.segment.text.as_str()).collect();
    assert_eq!(texts, vec!["hello", "", "there friend"]);
    assert!(!timeline[1].segment.is_ok());
    let angry = timeline[2].segment.emotion(EmotionKind::Angry).unwrap();
    assert!((angry - 40.0).abs() < 0.001);
}
