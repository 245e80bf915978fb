use std::collections::{BTreeSet, HashMap};

use callqi_db::models::{
    ConversationFlow, ConversationRule, GroupPosition, RuleMethod, SegmentWithSpeaker,
    SentenceGroup, Speaker,
};

use super::MatchedData;
use crate::dialogue::FlowLimits;

/// Tag ids each sentence of a round matched, by batch position.
pub fn extract_tag_sets(data: &[MatchedData]) -> Vec<BTreeSet<u64>> {
    data.iter().map(MatchedData::tag_ids).collect()
}

/// Resolves sentence criteria (sentence id to required tag ids) to the
/// 1-based positions whose matched tags contain all of them.
///
/// A sentence without tags never matches, and neither does a position with
/// no tags at all. Sentences with no position are left out.
pub fn sentences_match(
    seg_tags: &[BTreeSet<u64>],
    criteria: &HashMap<u64, Vec<u64>>,
) -> HashMap<u64, Vec<usize>> {
    let mut resp: HashMap<u64, Vec<usize>> = HashMap::with_capacity(criteria.len());
    for (sentence_id, tag_ids) in criteria {
        if tag_ids.is_empty() {
            continue;
        }
        let positions: Vec<usize> = seg_tags
            .iter()
            .enumerate()
            .filter(|(_, tags)| !tags.is_empty() && tag_ids.iter().all(|t| tags.contains(t)))
            .map(|(idx, _)| idx + 1)
            .collect();
        if !positions.is_empty() {
            resp.insert(*sentence_id, positions);
        }
    }
    resp
}

/// Keeps the positions spoken by `role`; `None` keeps all of them.
/// `spoken` is the batch the positions refer to.
pub fn role_positions(
    positions: &[usize],
    role: Option<Speaker>,
    spoken: &[&SegmentWithSpeaker],
) -> Vec<usize> {
    positions
        .iter()
        .copied()
        .filter(|pos| {
            spoken
                .get(pos.wrapping_sub(1))
                .is_some_and(|seg| role.is_none_or(|r| seg.speaker == r))
        })
        .collect()
}

/// Keeps the positions inside the group's head or tail window out of
/// `total` spoken segments. Groups without a position keep all of them.
pub fn window_positions(positions: &[usize], group: &SentenceGroup, total: usize) -> Vec<usize> {
    positions
        .iter()
        .copied()
        .filter(|&pos| match group.position {
            Some(GroupPosition::Head) => pos <= group.range,
            Some(GroupPosition::Tail) => total.saturating_sub(pos) <= group.range,
            None => true,
        })
        .collect()
}

/// Positions at which each sentence group is met: any member sentence
/// matched there, said by the group's role, inside the group's window.
pub fn sentence_group_match(
    matched_sentences: &HashMap<u64, Vec<usize>>,
    groups: &[&SentenceGroup],
    spoken: &[&SegmentWithSpeaker],
) -> HashMap<u64, Vec<usize>> {
    let mut resp: HashMap<u64, Vec<usize>> = HashMap::with_capacity(groups.len());
    for group in groups {
        let mut positions: BTreeSet<usize> = BTreeSet::new();
        for sentence_id in &group.sentence_ids {
            if let Some(matched) = matched_sentences.get(sentence_id) {
                let by_role = role_positions(matched, group.role, spoken);
                positions.extend(window_positions(&by_role, group, spoken.len()));
            }
        }
        if !positions.is_empty() {
            resp.insert(group.id, positions.into_iter().collect());
        }
    }
    resp
}

/// Per position, the uuids of the sentence groups met there, in group order.
/// This is the id sequence a flow's dialogue logic is evaluated against.
pub fn flow_sequence(
    group_matches: &HashMap<u64, Vec<usize>>,
    groups: &[&SentenceGroup],
    num_positions: usize,
) -> Vec<Vec<String>> {
    let mut sequence = vec![Vec::new(); num_positions];
    for group in groups {
        for pos in group_matches.get(&group.id).into_iter().flatten() {
            if let Some(slot) = sequence.get_mut(pos.wrapping_sub(1)) {
                slot.push(group.uuid.clone());
            }
        }
    }
    sequence
}

/// Repeat count and distance limits of a flow over its sentence groups.
/// A group's range limits distance only when the group has no position.
pub fn flow_limits(flow: &ConversationFlow, groups: &[&SentenceGroup]) -> FlowLimits {
    FlowLimits {
        repeat: flow.repeat,
        max_gap: groups
            .iter()
            .filter(|g| g.position.is_none() && g.range > 0)
            .map(|g| (g.uuid.clone(), g.range))
            .collect(),
    }
}

/// Whether a conversation rule holds given how many of its flows matched.
/// A `min` of zero always holds before the method is applied.
pub fn rule_match(rule: &ConversationRule, matched_flows: usize) -> bool {
    let hit = matched_flows >= rule.min;
    match rule.method {
        RuleMethod::Positive => hit,
        RuleMethod::Negative => !hit,
    }
}
