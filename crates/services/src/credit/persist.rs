use std::collections::HashSet;

use callqi_db::{CreditValid, LevelType, Whos};

use crate::dao::{BatchRow, CreditBatch, NewSegmentMatch};
use crate::rules::{RuleGroupCredit, RulesException, TagCredit};

struct BatchBuilder {
    batch: CreditBatch,
    seen_matches: HashSet<(u64, u64, Whos)>,
}

impl BatchBuilder {
    fn push(
        &mut self,
        parent: Option<usize>,
        level: LevelType,
        org_id: u64,
        valid: CreditValid,
        score: i32,
        whos: Whos,
    ) -> usize {
        self.batch.rows.push(BatchRow {
            parent,
            call_id: self.batch.call_id,
            level,
            org_id,
            valid,
            revise: CreditValid::Unactivated,
            score,
            whos,
        });
        self.batch.rows.len() - 1
    }

    /// Segment rows under a fired sentence, one per segment, plus the tag
    /// evidence behind them.
    fn push_segments<'a>(
        &mut self,
        parent: usize,
        tags: impl IntoIterator<Item = &'a TagCredit>,
        whos: Whos,
    ) {
        let mut seen_segments = HashSet::new();
        for tag in tags {
            if seen_segments.insert(tag.segment_id) {
                self.push(
                    Some(parent),
                    LevelType::Segment,
                    tag.segment_id,
                    CreditValid::Matched,
                    0,
                    whos,
                );
            }
            if self.seen_matches.insert((tag.segment_id, tag.tag_id, whos)) {
                self.batch.matches.push(NewSegmentMatch {
                    seg_id: tag.segment_id,
                    tag_id: tag.tag_id,
                    score: tag.score,
                    matched: tag.matched.clone(),
                    matched_text: tag.match_text.clone(),
                    whos,
                });
            }
        }
    }

    fn push_conversation(&mut self, parent: usize, group: &RuleGroupCredit) {
        for rule in &group.rules {
            let rule_idx = self.push(
                Some(parent),
                LevelType::Rule,
                rule.id,
                CreditValid::from_bool(rule.valid),
                rule.score,
                Whos::Conversation,
            );
            for flow in &rule.flows {
                let flow_idx = self.push(
                    Some(rule_idx),
                    LevelType::ConversationFlow,
                    flow.id,
                    CreditValid::from_bool(flow.valid),
                    0,
                    Whos::Conversation,
                );
                for sg in &flow.groups {
                    let sg_idx = self.push(
                        Some(flow_idx),
                        LevelType::SentenceGroup,
                        sg.id,
                        CreditValid::from_bool(sg.valid),
                        0,
                        Whos::Conversation,
                    );
                    for sentence in &sg.sentences {
                        let sentence_idx = self.push(
                            Some(sg_idx),
                            LevelType::Sentence,
                            sentence.id,
                            CreditValid::from_bool(sentence.valid),
                            0,
                            Whos::Conversation,
                        );
                        if sentence.valid {
                            let tags = sentence.segments.iter().flat_map(|s| s.tags.iter());
                            self.push_segments(sentence_idx, tags, Whos::Conversation);
                        }
                    }
                }
            }
        }
    }

    fn push_exception_rule(&mut self, parent: usize, rule: &RulesException) {
        let rule_idx = self.push(
            Some(parent),
            rule.level,
            rule.rule_id,
            CreditValid::from_bool(rule.valid),
            rule.score,
            rule.whos,
        );
        for exception in &rule.exceptions {
            let idx = self.push(
                Some(rule_idx),
                exception.level,
                exception.sentence_id,
                CreditValid::from_bool(exception.valid),
                0,
                rule.whos,
            );
            if exception.valid {
                self.push_segments(idx, &exception.tags, rule.whos);
            }
        }
        for seg in &rule.silence_segs {
            self.push(
                Some(rule_idx),
                LevelType::SilenceSegment,
                *seg,
                CreditValid::Unactivated,
                0,
                rule.whos,
            );
        }
        for seg in &rule.interposal_segs {
            self.push(
                Some(rule_idx),
                LevelType::InterposalSegment,
                *seg,
                CreditValid::Unactivated,
                0,
                rule.whos,
            );
        }
    }
}

/// Lays out one scoring run of a call as a credit batch.
///
/// The call root scores `base_score` plus every rule group; a rule group
/// scores its conversation rules plus its silence, speed and interposal
/// rules. Segment rows are only written under sentences that fired.
pub fn credit_batch(
    call_id: u64,
    create_time: i64,
    base_score: i32,
    groups: &[RuleGroupCredit],
    exceptions: &[RulesException],
) -> CreditBatch {
    let mut builder = BatchBuilder {
        batch: CreditBatch {
            call_id,
            create_time,
            ..Default::default()
        },
        seen_matches: HashSet::new(),
    };
    let root = builder.push(
        None,
        LevelType::Call,
        call_id,
        CreditValid::Unactivated,
        base_score,
        Whos::Conversation,
    );

    let mut group_ids: Vec<u64> = groups.iter().map(|g| g.id).collect();
    for rule in exceptions {
        if !group_ids.contains(&rule.rule_group_id) {
            group_ids.push(rule.rule_group_id);
        }
    }

    let mut total = base_score;
    for group_id in group_ids {
        let group_idx = builder.push(
            Some(root),
            LevelType::RuleGroup,
            group_id,
            CreditValid::Unactivated,
            0,
            Whos::Conversation,
        );
        let mut group_score = 0;
        if let Some(group) = groups.iter().find(|g| g.id == group_id) {
            builder.push_conversation(group_idx, group);
            group_score += group.score;
        }
        for rule in exceptions.iter().filter(|r| r.rule_group_id == group_id) {
            builder.push_exception_rule(group_idx, rule);
            group_score += rule.score;
        }
        builder.batch.rows[group_idx].score = group_score;
        total += group_score;
    }
    builder.batch.rows[root].score = total;
    builder.batch
}
