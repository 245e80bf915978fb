use callqi_db::models::{SegmentWithSpeaker, Sentence, SilenceRule, Speaker};
use callqi_db::{LevelType, Whos};
use tracing::debug;

use super::{
    ExceptionSet, RuleError, RulesException, SpokenIndex, breaks_longer_than, gated_score,
    segment_tag_credits,
};
use crate::matching::MatchedData;
use crate::matching::criteria::{extract_tag_sets, sentences_match};

/// A silence rule with its exception sentences resolved.
#[derive(Debug, Clone, Default)]
pub struct SilenceCheck {
    pub rule: SilenceRule,
    pub exceptions: ExceptionSet,
}

impl SilenceCheck {
    pub fn resolve(rule: SilenceRule, sentences: &[Sentence]) -> Self {
        let exceptions = ExceptionSet::resolve(
            rule.id,
            &[
                (
                    LevelType::BeforeStaffSentence,
                    rule.exception.before.staff.as_slice(),
                ),
                (
                    LevelType::BeforeCustomerSentence,
                    rule.exception.before.customer.as_slice(),
                ),
                (
                    LevelType::AfterStaffSentence,
                    rule.exception.after.staff.as_slice(),
                ),
            ],
            sentences,
        );
        Self { rule, exceptions }
    }

    /// Uuids of every exception sentence the rule names.
    pub fn exception_uuids(rule: &SilenceRule) -> impl Iterator<Item = &String> {
        rule.exception
            .before
            .staff
            .iter()
            .chain(rule.exception.before.customer.iter())
            .chain(rule.exception.after.staff.iter())
    }
}

/// Evaluates silence rules over a full timeline.
///
/// Silence segments longer than the rule's seconds are breaks; the rule holds
/// when there are at most `times` of them. It also holds when, around any
/// break, staff said a before/after exception sentence or the customer said
/// a before exception sentence as their nearest utterance.
///
/// `matched` holds one tag-match result per spoken segment, in timeline order.
pub fn check_silence(
    rule_group_id: u64,
    checks: &[SilenceCheck],
    timeline: &[SegmentWithSpeaker],
    matched: &[MatchedData],
) -> Result<Vec<RulesException>, RuleError> {
    if checks.is_empty() || timeline.is_empty() {
        return Ok(Vec::new());
    }
    let index = SpokenIndex::new(timeline, matched)?;
    let call_id = timeline[0].segment.call_id;
    let seg_tags = extract_tag_sets(matched);

    let mut resp = Vec::with_capacity(checks.len());
    for check in checks {
        let rule = &check.rule;
        let breaks = breaks_longer_than(timeline, Speaker::Silence, rule.seconds);
        let sentence_hits = sentences_match(&seg_tags, &check.exceptions.criteria);
        let mut exceptions = check.exceptions.blank_results();
        let mut exempted = false;

        for &pos in &breaks {
            let staff_before = index.nearest_before(pos, Speaker::Staff);
            let customer_before = index.nearest_before(pos, Speaker::Customer);
            let staff_after = index.nearest_after(pos, Speaker::Staff);

            for exception in exceptions.iter_mut() {
                let target = match exception.level {
                    LevelType::BeforeStaffSentence => staff_before,
                    LevelType::BeforeCustomerSentence => customer_before,
                    LevelType::AfterStaffSentence => staff_after,
                    _ => None,
                };
                let Some(target) = target else {
                    continue;
                };
                let said_there = sentence_hits
                    .get(&exception.sentence_id)
                    .is_some_and(|positions| positions.contains(&(target + 1)));
                if !said_there {
                    continue;
                }
                let segment_id = timeline_id(&index, target);
                exception.record(segment_tag_credits(matched, target, segment_id));
                exempted = true;
            }
        }

        let valid = exempted || breaks.len() <= rule.times;
        debug!(
            rule_id = rule.id,
            breaks = breaks.len(),
            exempted,
            valid,
            "Silence rule checked"
        );
        resp.push(RulesException {
            rule_id: rule.id,
            level: LevelType::SilenceRule,
            whos: Whos::Silence,
            call_id,
            valid,
            score: gated_score(rule.score, valid),
            rule_group_id,
            exceptions,
            silence_segs: breaks.iter().map(|&pos| timeline[pos].id()).collect(),
            interposal_segs: Vec::new(),
        });
    }
    Ok(resp)
}

fn timeline_id(index: &SpokenIndex<'_>, spoken_idx: usize) -> u64 {
    index.segment(spoken_idx).map(|s| s.id()).unwrap_or_default()
}
