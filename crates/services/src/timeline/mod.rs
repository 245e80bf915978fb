//! Turns the two per-channel ASR sentence streams of a call into one ordered,
//! speaker-classified segment timeline with silence and talk-over gaps made explicit.

mod gaps;
mod merge;

pub use gaps::inject_gaps;
pub use merge::merge_channels;

use callqi_config::TimelineSettings;
use callqi_db::models::{AsrResponse, ChannelRoles, Segment, SegmentWithSpeaker};
use tracing::debug;

/// Builds the full timeline for one call.
///
/// Segment ids are assigned 1-based in final timeline order, so they are
/// stable for a given ASR result and settings.
pub fn build_timeline(
    asr: &AsrResponse,
    roles: ChannelRoles,
    settings: &TimelineSettings,
) -> Vec<SegmentWithSpeaker> {
    let merged = merge_channels(
        asr.call_id,
        &asr.left_channel.sentences,
        &asr.right_channel.sentences,
        settings,
    );
    let mut segments = inject_gaps(merged, settings);
    for (idx, seg) in segments.iter_mut().enumerate() {
        seg.id = idx as u64 + 1;
    }
    debug!(
        call_id = asr.call_id,
        segments = segments.len(),
        "Timeline built"
    );
    classify(segments, roles)
}

/// Attaches the speaker to every segment according to the call's channel roles.
pub fn classify(segments: Vec<Segment>, roles: ChannelRoles) -> Vec<SegmentWithSpeaker> {
    segments
        .into_iter()
        .map(|segment| SegmentWithSpeaker {
            speaker: roles.speaker_for(segment.channel),
            segment,
        })
        .collect()
}

/// Segments spoken by staff or customer, in timeline order.
pub fn spoken(timeline: &[SegmentWithSpeaker]) -> Vec<&SegmentWithSpeaker> {
    timeline.iter().filter(|s| s.speaker.is_party()).collect()
}
