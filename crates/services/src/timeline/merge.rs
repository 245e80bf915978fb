use callqi_config::TimelineSettings;
use callqi_db::models::{AsrSentence, Channel, EmotionKind, Segment, SegmentEmotion};

/// Merges each channel's sentences into segments and interleaves both channels by start time.
///
/// Within a channel, a successful sentence is folded into the previous segment when
/// that segment is successful too, the gap is below `merge_gap_secs` and the combined
/// text stays under `max_segment_chars` characters. The angry score of a merged
/// segment is the highest score seen so far. Ties across channels keep left before right.
pub fn merge_channels(
    call_id: u64,
    left: &[AsrSentence],
    right: &[AsrSentence],
    settings: &TimelineSettings,
) -> Vec<Segment> {
    let mut segments = merge_channel(call_id, Channel::Left, left, settings);
    segments.extend(merge_channel(call_id, Channel::Right, right, settings));
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

fn merge_channel(
    call_id: u64,
    channel: Channel,
    sentences: &[AsrSentence],
    settings: &TimelineSettings,
) -> Vec<Segment> {
    let mut ordered: Vec<&AsrSentence> = sentences.iter().collect();
    ordered.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut segments: Vec<Segment> = Vec::with_capacity(ordered.len());
    let mut last_chars = 0usize;

    for sen in ordered {
        let chars = sen.text.chars().count();
        if let Some(last) = segments.last_mut() {
            let mergeable = last.is_ok()
                && sen.status == callqi_db::models::STATUS_OK
                && sen.start - last.end < settings.merge_gap_secs
                && last_chars + chars < settings.max_segment_chars;
            if mergeable {
                last.end = last.end.max(sen.end);
                last.text.push(' ');
                last.text.push_str(&sen.text);
                if let Some(angry) = last
                    .emotions
                    .iter_mut()
                    .find(|e| e.kind == EmotionKind::Angry)
                {
                    angry.score = angry.score.max(sen.emotion);
                }
                last_chars += chars + 1;
                continue;
            }
        }

        segments.push(Segment {
            id: 0,
            call_id,
            start: sen.start,
            end: sen.end,
            text: sen.text.clone(),
            status: sen.status,
            channel,
            emotions: vec![SegmentEmotion {
                kind: EmotionKind::Angry,
                score: sen.emotion,
            }],
        });
        last_chars = chars;
    }

    segments
}
