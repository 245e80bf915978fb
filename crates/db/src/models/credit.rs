use serde::{Deserialize, Serialize};

use crate::level::{CreditValid, LevelType, Whos};

/// One scored node of a call's credit tree, stored flat and linked by `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCredit {
    #[serde(rename = "_id")]
    pub id: u64,
    pub call_id: u64,
    #[serde(rename = "type")]
    pub level: LevelType,
    /// Zero for roots.
    pub parent_id: u64,
    /// Natural id of the rule, flow, sentence or segment this row scores.
    pub org_id: u64,
    pub valid: CreditValid,
    #[serde(default)]
    pub revise: CreditValid,
    pub score: i32,
    #[serde(default)]
    pub whos: Whos,
    pub create_time: i64,
    pub update_time: i64,
}

impl SimpleCredit {
    pub const COLLECTION: &'static str = "credits";
}

/// Aggregate credit row of a call group; same shape as [`SimpleCredit`]
/// plus the group it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCallGroup {
    #[serde(rename = "_id")]
    pub id: u64,
    pub call_group_id: u64,
    /// Member call that decided the row's outcome, zero when none did.
    #[serde(default)]
    pub call_id: u64,
    #[serde(rename = "type")]
    pub level: LevelType,
    pub parent_id: u64,
    pub org_id: u64,
    pub valid: CreditValid,
    #[serde(default)]
    pub revise: CreditValid,
    pub score: i32,
    pub create_time: i64,
    pub update_time: i64,
}

impl CreditCallGroup {
    pub const COLLECTION: &'static str = "credit_call_groups";
}

/// Evidence that a segment matched a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMatch {
    #[serde(rename = "_id")]
    pub id: u64,
    /// Segment ids restart for every call, so evidence is keyed by both.
    pub call_id: u64,
    pub seg_id: u64,
    pub tag_id: u64,
    pub score: i32,
    /// Keyword the predictor matched on.
    #[serde(rename = "match", default)]
    pub matched: String,
    /// Segment text the keyword was found in.
    #[serde(default)]
    pub matched_text: String,
    pub create_time: i64,
    #[serde(default)]
    pub whos: Whos,
}

impl SegmentMatch {
    pub const COLLECTION: &'static str = "segment_matches";
}
