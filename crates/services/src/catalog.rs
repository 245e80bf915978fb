use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use callqi_db::models::{
    ConversationFlow, ConversationRule, InterposalRule, RuleGroup, Sentence, SentenceGroup,
    SilenceRule, SpeedRule,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Rule group not found: {0}")]
    RuleGroupNotFound(u64),
    #[error("Catalog load failed: {0}")]
    Load(String),
    #[error("Catalog parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything needed to score a call against one rule group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleGroupSetting {
    pub group: RuleGroup,
    pub rules: Vec<ConversationRule>,
    pub flows: Vec<ConversationFlow>,
    pub sentence_groups: Vec<SentenceGroup>,
    /// Sentences of the conversation rules' sentence groups.
    pub sentences: Vec<Sentence>,
    pub silence_rules: Vec<SilenceRule>,
    pub speed_rules: Vec<SpeedRule>,
    pub interposal_rules: Vec<InterposalRule>,
}

/// Rule settings and the sentence/tag mapping behind them.
#[async_trait]
pub trait SettingLookup: Send + Sync + 'static {
    async fn rule_group(&self, id: u64) -> Result<RuleGroupSetting, LookupError>;

    /// Sentences by uuid. Unknown uuids are left out.
    async fn sentences_by_uuid(&self, uuids: &[String]) -> Result<Vec<Sentence>, LookupError>;

    /// Tag ids per sentence id. Unknown ids are left out.
    async fn sentence_tags(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u64>>, LookupError>;
}

/// In-memory [`SettingLookup`] loaded from a JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticCatalog {
    pub rule_groups: Vec<RuleGroup>,
    pub rules: Vec<ConversationRule>,
    pub flows: Vec<ConversationFlow>,
    pub sentence_groups: Vec<SentenceGroup>,
    pub sentences: Vec<Sentence>,
    pub silence_rules: Vec<SilenceRule>,
    pub speed_rules: Vec<SpeedRule>,
    pub interposal_rules: Vec<InterposalRule>,
}

impl StaticCatalog {
    pub fn from_json_str(raw: &str) -> Result<Self, LookupError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, LookupError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LookupError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Resolves `ids` against `items`, keeping the order of `ids`.
    fn pick<'a, T>(
        kind: &str,
        owner: u64,
        ids: &[u64],
        items: &'a [T],
        id_of: impl Fn(&T) -> u64,
    ) -> Vec<&'a T> {
        ids.iter()
            .filter_map(|id| {
                let found = items.iter().find(|item| id_of(item) == *id);
                if found.is_none() {
                    warn!(kind, owner, id, "Referenced setting not found, skipped");
                }
                found
            })
            .collect()
    }
}

#[async_trait]
impl SettingLookup for StaticCatalog {
    async fn rule_group(&self, id: u64) -> Result<RuleGroupSetting, LookupError> {
        let group = self
            .rule_groups
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or(LookupError::RuleGroupNotFound(id))?;

        let rules: Vec<ConversationRule> =
            Self::pick("rule", id, &group.rule_ids, &self.rules, |r| r.id)
                .into_iter()
                .cloned()
                .collect();

        let mut flows: Vec<ConversationFlow> = Vec::new();
        for rule in &rules {
            for flow in Self::pick("flow", rule.id, &rule.flow_ids, &self.flows, |f| f.id) {
                if !flows.iter().any(|f| f.id == flow.id) {
                    flows.push(flow.clone());
                }
            }
        }

        let mut sentence_groups: Vec<SentenceGroup> = Vec::new();
        for flow in &flows {
            let picked = Self::pick(
                "sentence_group",
                flow.id,
                &flow.sentence_group_ids,
                &self.sentence_groups,
                |g| g.id,
            );
            for sg in picked {
                if !sentence_groups.iter().any(|g| g.id == sg.id) {
                    sentence_groups.push(sg.clone());
                }
            }
        }

        let mut sentences: Vec<Sentence> = Vec::new();
        for sg in &sentence_groups {
            for sentence in Self::pick("sentence", sg.id, &sg.sentence_ids, &self.sentences, |s| s.id) {
                if !sentences.iter().any(|s| s.id == sentence.id) {
                    sentences.push(sentence.clone());
                }
            }
        }

        let silence_rules = Self::pick(
            "silence_rule",
            id,
            &group.silence_rule_ids,
            &self.silence_rules,
            |r| r.id,
        )
        .into_iter()
        .cloned()
        .collect();
        let speed_rules = Self::pick("speed_rule", id, &group.speed_rule_ids, &self.speed_rules, |r| r.id)
            .into_iter()
            .cloned()
            .collect();
        let interposal_rules = Self::pick(
            "interposal_rule",
            id,
            &group.interposal_rule_ids,
            &self.interposal_rules,
            |r| r.id,
        )
        .into_iter()
        .cloned()
        .collect();

        Ok(RuleGroupSetting {
            group,
            rules,
            flows,
            sentence_groups,
            sentences,
            silence_rules,
            speed_rules,
            interposal_rules,
        })
    }

    async fn sentences_by_uuid(&self, uuids: &[String]) -> Result<Vec<Sentence>, LookupError> {
        Ok(self
            .sentences
            .iter()
            .filter(|s| uuids.contains(&s.uuid))
            .cloned()
            .collect())
    }

    async fn sentence_tags(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u64>>, LookupError> {
        Ok(self
            .sentences
            .iter()
            .filter(|s| ids.contains(&s.id))
            .map(|s| (s.id, s.tag_ids.clone()))
            .collect())
    }
}
