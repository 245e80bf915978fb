use serde::{Deserialize, Serialize};

use super::segment::Speaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMethod {
    /// The rule passes when its flows are present.
    #[default]
    Positive,
    /// The rule passes when its flows are absent.
    Negative,
}

/// Bundle of rules applied to a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rule_ids: Vec<u64>,
    #[serde(default)]
    pub silence_rule_ids: Vec<u64>,
    #[serde(default)]
    pub speed_rule_ids: Vec<u64>,
    #[serde(default)]
    pub interposal_rule_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRule {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub method: RuleMethod,
    pub score: i32,
    /// Least number of matched flows for the rule to hold.
    #[serde(default = "default_min")]
    pub min: usize,
    #[serde(default)]
    pub flow_ids: Vec<u64>,
}

fn default_min() -> usize {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlow {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    /// Dialogue logic over sentence-group uuids, e.g. `must greet then verify`.
    pub expression: String,
    #[serde(default)]
    pub sentence_group_ids: Vec<u64>,
    /// Times the expression has to be satisfied in one call; zero counts as once.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_repeat() -> usize {
    1
}

/// Part of the call a sentence group has to be said in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPosition {
    /// Within the first `range` spoken segments.
    Head,
    /// Within the last `range` spoken segments after the final one.
    Tail,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentenceGroup {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    /// Only segments spoken by this party count; `None` accepts anyone.
    #[serde(default)]
    pub role: Option<Speaker>,
    #[serde(default)]
    pub sentence_ids: Vec<u64>,
    #[serde(default)]
    pub position: Option<GroupPosition>,
    /// Window size for `position`. Without a position, the most spoken
    /// segments the group may follow the previous clause of a flow by;
    /// zero is unbounded.
    #[serde(default)]
    pub range: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    /// A segment matches the sentence when it matches every tag.
    #[serde(default)]
    pub tag_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyException {
    #[serde(default)]
    pub staff: Vec<String>,
    #[serde(default)]
    pub customer: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaffException {
    #[serde(default)]
    pub staff: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerException {
    #[serde(default)]
    pub customer: Vec<String>,
}

/// Exception sentences (by uuid) allowed around a long silence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilenceException {
    #[serde(default)]
    pub before: PartyException,
    #[serde(default)]
    pub after: StaffException,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilenceRule {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub score: i32,
    /// Silences longer than this many seconds break the rule.
    pub seconds: f64,
    /// Breaks tolerated before the rule fails.
    pub times: usize,
    #[serde(default)]
    pub exception: SilenceException,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedRule {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub score: i32,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub exception_under: CustomerException,
    #[serde(default)]
    pub exception_over: CustomerException,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterposalRule {
    pub id: u64,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub score: i32,
    pub seconds: f64,
    pub times: usize,
}
