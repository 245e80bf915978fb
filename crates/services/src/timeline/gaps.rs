use callqi_config::TimelineSettings;
use callqi_db::models::{Channel, Segment};

/// Makes dead air and talk-over explicit.
///
/// `segments` must already be ordered by start. A segment that starts while an
/// earlier one is still open gets an interposal segment covering the overlap in
/// front of it; a gap of at least `min_silence_secs` after everything said so far
/// gets a silence segment. Output stays ordered by start.
pub fn inject_gaps(segments: Vec<Segment>, settings: &TimelineSettings) -> Vec<Segment> {
    let mut out = Vec::with_capacity(segments.len() * 2);
    let mut open_end: Option<f64> = None;

    for seg in segments {
        if let Some(open) = open_end {
            if seg.start < open {
                let end = open.min(seg.end);
                if end > seg.start {
                    out.push(Segment::synthetic(
                        seg.call_id,
                        Channel::Interposal,
                        seg.start,
                        end,
                    ));
                }
            } else if seg.start - open >= settings.min_silence_secs && seg.start > open {
                out.push(Segment::synthetic(
                    seg.call_id,
                    Channel::Silence,
                    open,
                    seg.start,
                ));
            }
        }
        open_end = Some(open_end.map_or(seg.end, |open| open.max(seg.end)));
        out.push(seg);
    }

    out
}
