//! Call-level rules evaluated over the whole timeline: silence, talk speed and
//! interposal, plus conversation rules over matched dialogue.

pub mod conversation;
pub mod interposal;
pub mod silence;
pub mod speed;

use std::collections::HashMap;

use callqi_db::models::{SegmentWithSpeaker, Sentence, Speaker};
use callqi_db::{LevelType, Whos};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::matching::{AttrResult, MatchedData};

pub use conversation::{
    ConversationPlan, FlowCredit, RuleCredit, RuleGroupCredit, SegmentEvidence,
    SentenceCredit, SentenceGroupCredit,
};
pub use interposal::check_interposal;
pub use silence::{SilenceCheck, check_silence};
pub use speed::{SpeedCheck, check_speed};

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Timeline has {spoken} spoken segments but {matched} tag-match results")]
    MatchedLength { spoken: usize, matched: usize },
    #[error("Flow {flow_id} has an invalid expression: {source}")]
    Expression {
        flow_id: u64,
        source: crate::dialogue::ExpressionError,
    },
}

/// A tag hit recorded as evidence for a credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCredit {
    pub tag_id: u64,
    pub score: i32,
    /// 1-based position of the segment in the tag-match batch.
    pub segment_idx: usize,
    pub segment_id: u64,
    #[serde(rename = "match", default)]
    pub matched: String,
    #[serde(default)]
    pub match_text: String,
}

impl TagCredit {
    fn from_hit(tag_id: u64, hit: &AttrResult, segment_idx: usize, segment_id: u64) -> Self {
        Self {
            tag_id,
            score: hit.score,
            segment_idx,
            segment_id,
            matched: hit.matched.clone(),
            match_text: hit.match_text.clone(),
        }
    }
}

/// One configured exception sentence and whether it fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionMatched {
    pub sentence_id: u64,
    /// One of the exception-sentence levels (41..=44).
    pub level: LevelType,
    pub valid: bool,
    #[serde(default)]
    pub tags: Vec<TagCredit>,
}

impl ExceptionMatched {
    fn record(&mut self, tags: impl IntoIterator<Item = TagCredit>) {
        self.valid = true;
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }
}

/// Outcome of one silence, speed or interposal rule on one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesException {
    pub rule_id: u64,
    pub level: LevelType,
    pub whos: Whos,
    pub call_id: u64,
    pub valid: bool,
    pub score: i32,
    pub rule_group_id: u64,
    #[serde(default)]
    pub exceptions: Vec<ExceptionMatched>,
    /// Ids of the silence segments that broke the rule.
    #[serde(default)]
    pub silence_segs: Vec<u64>,
    /// Ids of the interposal segments that broke the rule.
    #[serde(default)]
    pub interposal_segs: Vec<u64>,
}

/// Contribution of a rule to the call score. A positive score counts only
/// when the rule holds, a negative one only when it is broken.
pub fn gated_score(score: i32, valid: bool) -> i32 {
    match (score > 0, score < 0) {
        (true, _) if valid => score,
        (_, true) if !valid => score,
        _ => 0,
    }
}

/// Exception sentences of one rule, resolved to ids and tag criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionSet {
    pub entries: Vec<(LevelType, u64)>,
    /// Sentence id to the tags a segment needs to say it.
    pub criteria: HashMap<u64, Vec<u64>>,
}

impl ExceptionSet {
    /// Resolves uuid lists per exception level. Unknown uuids are skipped
    /// with a warning, so the rule just loses that exception.
    pub fn resolve(rule_id: u64, lists: &[(LevelType, &[String])], sentences: &[Sentence]) -> Self {
        let by_uuid: HashMap<&str, &Sentence> =
            sentences.iter().map(|s| (s.uuid.as_str(), s)).collect();
        let mut set = ExceptionSet::default();
        for (level, uuids) in lists {
            for uuid in uuids.iter() {
                let Some(sentence) = by_uuid.get(uuid.as_str()) else {
                    warn!(rule_id, %uuid, ?level, "Exception sentence not found, skipped");
                    continue;
                };
                if !set.entries.contains(&(*level, sentence.id)) {
                    set.entries.push((*level, sentence.id));
                }
                set.criteria
                    .entry(sentence.id)
                    .or_insert_with(|| sentence.tag_ids.clone());
            }
        }
        set
    }

    /// Directly from sentence ids and their tags.
    pub fn from_ids(
        entries: impl IntoIterator<Item = (LevelType, u64)>,
        criteria: HashMap<u64, Vec<u64>>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            criteria,
        }
    }

    fn blank_results(&self) -> Vec<ExceptionMatched> {
        self.entries
            .iter()
            .map(|(level, sentence_id)| ExceptionMatched {
                sentence_id: *sentence_id,
                level: *level,
                valid: false,
                tags: Vec::new(),
            })
            .collect()
    }
}

/// Timeline positions mapped onto the spoken batch the predictor saw.
pub(crate) struct SpokenIndex<'a> {
    timeline: &'a [SegmentWithSpeaker],
    /// 0-based spoken index per timeline position.
    spoken_of: Vec<Option<usize>>,
    spoken: Vec<&'a SegmentWithSpeaker>,
}

impl<'a> SpokenIndex<'a> {
    pub(crate) fn new(
        timeline: &'a [SegmentWithSpeaker],
        matched: &[MatchedData],
    ) -> Result<Self, RuleError> {
        let mut spoken = Vec::new();
        let spoken_of: Vec<Option<usize>> = timeline
            .iter()
            .map(|seg| {
                seg.speaker.is_party().then(|| {
                    spoken.push(seg);
                    spoken.len() - 1
                })
            })
            .collect();
        if spoken.len() != matched.len() {
            return Err(RuleError::MatchedLength {
                spoken: spoken.len(),
                matched: matched.len(),
            });
        }
        Ok(Self {
            timeline,
            spoken_of,
            spoken,
        })
    }

    /// Spoken index of the nearest segment by `speaker` before timeline position `pos`.
    pub(crate) fn nearest_before(&self, pos: usize, speaker: Speaker) -> Option<usize> {
        (0..pos)
            .rev()
            .find(|&j| self.timeline[j].speaker == speaker)
            .and_then(|j| self.spoken_of[j])
    }

    /// Spoken index of the nearest segment by `speaker` after timeline position `pos`.
    pub(crate) fn nearest_after(&self, pos: usize, speaker: Speaker) -> Option<usize> {
        (pos + 1..self.timeline.len())
            .find(|&j| self.timeline[j].speaker == speaker)
            .and_then(|j| self.spoken_of[j])
    }

    pub(crate) fn segment(&self, spoken_idx: usize) -> Option<&'a SegmentWithSpeaker> {
        self.spoken.get(spoken_idx).copied()
    }
}

/// All hits of one spoken segment as tag credits.
pub(crate) fn segment_tag_credits(
    matched: &[MatchedData],
    spoken_idx: usize,
    segment_id: u64,
) -> Vec<TagCredit> {
    matched
        .get(spoken_idx)
        .map(|data| {
            data.hits()
                .iter()
                .map(|(tag, hit)| TagCredit::from_hit(*tag, hit, spoken_idx + 1, segment_id))
                .collect()
        })
        .unwrap_or_default()
}

/// Timeline positions of `speaker` segments longer than `seconds`, longest first.
pub(crate) fn breaks_longer_than(
    timeline: &[SegmentWithSpeaker],
    speaker: Speaker,
    seconds: f64,
) -> Vec<usize> {
    let mut runs: Vec<(usize, f64)> = timeline
        .iter()
        .enumerate()
        .filter(|(_, seg)| seg.speaker == speaker)
        .map(|(idx, seg)| (idx, seg.duration()))
        .collect();
    runs.sort_by(|a, b| b.1.total_cmp(&a.1));
    runs.into_iter()
        .take_while(|(_, duration)| *duration > seconds)
        .map(|(idx, _)| idx)
        .collect()
}
