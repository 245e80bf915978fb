use std::collections::{BTreeSet, HashMap};

use callqi_db::models::{SegmentWithSpeaker, SentenceGroup};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RuleError, TagCredit, gated_score};
use crate::catalog::RuleGroupSetting;
use crate::dialogue::FlowMachine;
use crate::matching::MatchedData;
use crate::matching::criteria::{
    extract_tag_sets, flow_limits, flow_sequence, role_positions, rule_match,
    sentence_group_match, sentences_match, window_positions,
};

/// A spoken segment that said a sentence, with the tag hits that prove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEvidence {
    pub segment_id: u64,
    /// 1-based position in the tag-match batch.
    pub segment_idx: usize,
    pub tags: Vec<TagCredit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceCredit {
    pub id: u64,
    pub valid: bool,
    pub segments: Vec<SegmentEvidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceGroupCredit {
    pub id: u64,
    pub valid: bool,
    pub sentences: Vec<SentenceCredit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCredit {
    pub id: u64,
    pub valid: bool,
    pub groups: Vec<SentenceGroupCredit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCredit {
    pub id: u64,
    pub valid: bool,
    pub score: i32,
    pub flows: Vec<FlowCredit>,
}

/// Conversation-rule outcome of one rule group on one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroupCredit {
    pub id: u64,
    /// Sum of the rule scores.
    pub score: i32,
    pub rules: Vec<RuleCredit>,
}

/// A rule group's conversation rules with every flow expression compiled.
#[derive(Debug, Clone)]
pub struct ConversationPlan {
    setting: RuleGroupSetting,
    machines: HashMap<u64, FlowMachine>,
}

impl ConversationPlan {
    /// Compiles every flow; any malformed expression fails the whole plan.
    pub fn compile(setting: RuleGroupSetting) -> Result<Self, RuleError> {
        let mut machines = HashMap::with_capacity(setting.flows.len());
        for flow in &setting.flows {
            let machine = FlowMachine::compile(&flow.expression).map_err(|source| {
                RuleError::Expression {
                    flow_id: flow.id,
                    source,
                }
            })?;
            machines.insert(flow.id, machine);
        }
        Ok(Self { setting, machines })
    }

    pub fn setting(&self) -> &RuleGroupSetting {
        &self.setting
    }

    /// Tags the predictor has to be asked about for this group's sentences.
    pub fn tag_ids(&self) -> BTreeSet<u64> {
        self.setting
            .sentences
            .iter()
            .flat_map(|s| s.tag_ids.iter().copied())
            .collect()
    }

    /// Scores the conversation rules over the spoken segments and their tag
    /// results, which must line up one to one.
    pub fn evaluate(
        &self,
        spoken: &[&SegmentWithSpeaker],
        matched: &[MatchedData],
    ) -> Result<RuleGroupCredit, RuleError> {
        if spoken.len() != matched.len() {
            return Err(RuleError::MatchedLength {
                spoken: spoken.len(),
                matched: matched.len(),
            });
        }

        let criteria: HashMap<u64, Vec<u64>> = self
            .setting
            .sentences
            .iter()
            .map(|s| (s.id, s.tag_ids.clone()))
            .collect();
        let sentence_hits = sentences_match(&extract_tag_sets(matched), &criteria);
        let all_groups: Vec<&SentenceGroup> = self.setting.sentence_groups.iter().collect();
        let group_hits = sentence_group_match(&sentence_hits, &all_groups, spoken);

        let mut rules = Vec::with_capacity(self.setting.rules.len());
        for rule in &self.setting.rules {
            let mut flows = Vec::with_capacity(rule.flow_ids.len());
            for flow_id in &rule.flow_ids {
                let Some(flow) = self.setting.flows.iter().find(|f| f.id == *flow_id) else {
                    continue;
                };
                let Some(machine) = self.machines.get(flow_id) else {
                    continue;
                };
                let groups: Vec<&SentenceGroup> = flow
                    .sentence_group_ids
                    .iter()
                    .filter_map(|id| all_groups.iter().copied().find(|g| g.id == *id))
                    .collect();
                let sequence = flow_sequence(&group_hits, &groups, spoken.len());
                let valid = machine.accepts_limited(&sequence, &flow_limits(flow, &groups));

                flows.push(FlowCredit {
                    id: flow.id,
                    valid,
                    groups: groups
                        .iter()
                        .map(|group| self.group_credit(group, &sentence_hits, spoken, matched))
                        .collect(),
                });
            }

            let matched_flows = flows.iter().filter(|f| f.valid).count();
            let valid = rule_match(rule, matched_flows);
            let score = gated_score(rule.score, valid);
            debug!(
                rule_id = rule.id,
                matched_flows, valid, score, "Conversation rule checked"
            );
            rules.push(RuleCredit {
                id: rule.id,
                valid,
                score,
                flows,
            });
        }

        Ok(RuleGroupCredit {
            id: self.setting.group.id,
            score: rules.iter().map(|r| r.score).sum(),
            rules,
        })
    }

    fn group_credit(
        &self,
        group: &SentenceGroup,
        sentence_hits: &HashMap<u64, Vec<usize>>,
        spoken: &[&SegmentWithSpeaker],
        matched: &[MatchedData],
    ) -> SentenceGroupCredit {
        let sentences: Vec<SentenceCredit> = group
            .sentence_ids
            .iter()
            .filter_map(|id| self.setting.sentences.iter().find(|s| s.id == *id))
            .map(|sentence| {
                let positions = sentence_hits
                    .get(&sentence.id)
                    .map(|p| {
                        let by_role = role_positions(p, group.role, spoken);
                        window_positions(&by_role, group, spoken.len())
                    })
                    .unwrap_or_default();
                let segments: Vec<SegmentEvidence> = positions
                    .iter()
                    .map(|&pos| {
                        let segment_id = spoken[pos - 1].id();
                        let tags = sentence
                            .tag_ids
                            .iter()
                            .filter_map(|tag| {
                                matched[pos - 1]
                                    .get(*tag)
                                    .map(|hit| TagCredit::from_hit(*tag, &hit, pos, segment_id))
                            })
                            .collect();
                        SegmentEvidence {
                            segment_id,
                            segment_idx: pos,
                            tags,
                        }
                    })
                    .collect();
                SentenceCredit {
                    id: sentence.id,
                    valid: !segments.is_empty(),
                    segments,
                }
            })
            .collect();

        SentenceGroupCredit {
            id: group.id,
            valid: sentences.iter().any(|s| s.valid),
            sentences,
        }
    }
}
