use callqi_db::models::{InterposalRule, SegmentWithSpeaker, Speaker};
use callqi_db::{LevelType, Whos};
use tracing::debug;

use super::{RulesException, breaks_longer_than, gated_score};

/// Evaluates interposal rules: talk-over segments longer than the rule's
/// seconds are breaks, and the rule holds with at most `times` of them.
pub fn check_interposal(
    rule_group_id: u64,
    rules: &[InterposalRule],
    timeline: &[SegmentWithSpeaker],
) -> Vec<RulesException> {
    if rules.is_empty() || timeline.is_empty() {
        return Vec::new();
    }
    let call_id = timeline[0].segment.call_id;

    rules
        .iter()
        .map(|rule| {
            let breaks = breaks_longer_than(timeline, Speaker::Interposal, rule.seconds);
            let valid = breaks.len() <= rule.times;
            debug!(
                rule_id = rule.id,
                breaks = breaks.len(),
                valid,
                "Interposal rule checked"
            );
            RulesException {
                rule_id: rule.id,
                level: LevelType::InterposalRule,
                whos: Whos::Interposal,
                call_id,
                valid,
                score: gated_score(rule.score, valid),
                rule_group_id,
                exceptions: Vec::new(),
                silence_segs: Vec::new(),
                interposal_segs: breaks.iter().map(|&pos| timeline[pos].id()).collect(),
            }
        })
        .collect()
}
