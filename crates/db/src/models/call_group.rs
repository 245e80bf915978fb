use serde::{Deserialize, Serialize};

/// Calls grouped together (same customer, same case) for aggregate scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGroup {
    #[serde(rename = "_id")]
    pub id: u64,
    #[serde(default)]
    pub call_ids: Vec<u64>,
    #[serde(default)]
    pub is_delete: bool,
    pub create_time: i64,
    pub update_time: i64,
}

impl CallGroup {
    pub const COLLECTION: &'static str = "call_groups";

    pub fn active_members(&self) -> &[u64] {
        if self.is_delete { &[] } else { &self.call_ids }
    }
}
