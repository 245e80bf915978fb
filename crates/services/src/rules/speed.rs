use callqi_db::models::{SegmentWithSpeaker, Sentence, Speaker, SpeedRule};
use callqi_db::{LevelType, Whos};
use tracing::debug;

use super::{
    ExceptionSet, RuleError, RulesException, SpokenIndex, gated_score, segment_tag_credits,
};
use crate::matching::MatchedData;
use crate::matching::criteria::{extract_tag_sets, sentences_match};

/// A speed rule with its exception sentences resolved. "Under" exceptions
/// are stored at the before-customer level, "over" ones at after-customer.
#[derive(Debug, Clone, Default)]
pub struct SpeedCheck {
    pub rule: SpeedRule,
    pub exceptions: ExceptionSet,
}

impl SpeedCheck {
    pub fn resolve(rule: SpeedRule, sentences: &[Sentence]) -> Self {
        let exceptions = ExceptionSet::resolve(
            rule.id,
            &[
                (
                    LevelType::BeforeCustomerSentence,
                    rule.exception_under.customer.as_slice(),
                ),
                (
                    LevelType::AfterCustomerSentence,
                    rule.exception_over.customer.as_slice(),
                ),
            ],
            sentences,
        );
        Self { rule, exceptions }
    }

    pub fn exception_uuids(rule: &SpeedRule) -> impl Iterator<Item = &String> {
        rule.exception_under
            .customer
            .iter()
            .chain(rule.exception_over.customer.iter())
    }
}

/// Evaluates speed rules against the staff talk speed of the call.
///
/// The rule holds when `staff_speed` lies within `[min, max]`, or when the
/// customer said any of the rule's exception sentences anywhere in the call.
pub fn check_speed(
    rule_group_id: u64,
    checks: &[SpeedCheck],
    timeline: &[SegmentWithSpeaker],
    matched: &[MatchedData],
    staff_speed: f64,
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
        let in_range = staff_speed >= rule.min && staff_speed <= rule.max;
        let sentence_hits = sentences_match(&seg_tags, &check.exceptions.criteria);
        let mut exceptions = check.exceptions.blank_results();
        let mut exempted = false;

        for exception in exceptions.iter_mut() {
            let Some(positions) = sentence_hits.get(&exception.sentence_id) else {
                continue;
            };
            for &pos in positions {
                let spoken_idx = pos - 1;
                let Some(segment) = index.segment(spoken_idx) else {
                    continue;
                };
                if segment.speaker != Speaker::Customer {
                    continue;
                }
                exception.record(segment_tag_credits(matched, spoken_idx, segment.id()));
                exempted = true;
            }
        }

        let valid = in_range || exempted;
        debug!(
            rule_id = rule.id,
            staff_speed, in_range, exempted, valid, "Speed rule checked"
        );
        resp.push(RulesException {
            rule_id: rule.id,
            level: LevelType::SpeedRule,
            whos: Whos::Speed,
            call_id,
            valid,
            score: gated_score(rule.score, valid),
            rule_group_id,
            exceptions,
            silence_segs: Vec::new(),
            interposal_segs: Vec::new(),
        });
    }
    Ok(resp)
}
