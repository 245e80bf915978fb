use std::collections::HashMap;

use async_trait::async_trait;
use callqi_db::models::{CreditCallGroup, SegmentMatch, SimpleCredit};
use parking_lot::RwLock;

use super::base::DaoResult;
use super::credit::{CreditBatch, CreditStore, GroupCreditBatch};

#[derive(Debug, Default)]
struct MemoryState {
    credits: Vec<SimpleCredit>,
    group_credits: Vec<CreditCallGroup>,
    matches: Vec<SegmentMatch>,
    groups: HashMap<u64, Vec<u64>>,
    next_id: u64,
}

impl MemoryState {
    fn take_ids(&mut self, count: usize) -> Vec<u64> {
        let first = self.next_id + 1;
        self.next_id += count as u64;
        (first..=self.next_id).collect()
    }
}

/// [`CreditStore`] kept in process memory, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCreditStore {
    state: RwLock<MemoryState>,
}

impl MemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_group(&self, call_group_id: u64, call_ids: Vec<u64>) {
        self.state.write().groups.insert(call_group_id, call_ids);
    }

    /// Stores rows as-is, for seeding history.
    pub fn seed_credits(&self, rows: Vec<SimpleCredit>) {
        let mut state = self.state.write();
        let top = rows.iter().map(|r| r.id).max().unwrap_or(0);
        state.next_id = state.next_id.max(top);
        state.credits.extend(rows);
    }

    pub fn seed_matches(&self, matches: Vec<SegmentMatch>) {
        let mut state = self.state.write();
        let top = matches.iter().map(|m| m.id).max().unwrap_or(0);
        state.next_id = state.next_id.max(top);
        state.matches.extend(matches);
    }

    pub fn all_credits(&self) -> Vec<SimpleCredit> {
        self.state.read().credits.clone()
    }

    pub fn all_matches(&self) -> Vec<SegmentMatch> {
        self.state.read().matches.clone()
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn call_credits(&self, call_id: u64) -> DaoResult<Vec<SimpleCredit>> {
        Ok(self
            .state
            .read()
            .credits
            .iter()
            .filter(|c| c.call_id == call_id)
            .cloned()
            .collect())
    }

    async fn group_credits(&self, call_group_id: u64) -> DaoResult<Vec<CreditCallGroup>> {
        Ok(self
            .state
            .read()
            .group_credits
            .iter()
            .filter(|c| c.call_group_id == call_group_id)
            .cloned()
            .collect())
    }

    async fn segment_matches(
        &self,
        call_id: u64,
        seg_ids: &[u64],
    ) -> DaoResult<Vec<SegmentMatch>> {
        Ok(self
            .state
            .read()
            .matches
            .iter()
            .filter(|m| m.call_id == call_id && seg_ids.contains(&m.seg_id))
            .cloned()
            .collect())
    }

    async fn group_members(&self, call_group_id: u64) -> DaoResult<Vec<u64>> {
        Ok(self
            .state
            .read()
            .groups
            .get(&call_group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_credit_batch(&self, batch: CreditBatch) -> DaoResult<Vec<u64>> {
        batch.validate()?;
        let mut state = self.state.write();
        let row_ids = state.take_ids(batch.rows.len());
        let match_ids = state.take_ids(batch.matches.len());
        let (credits, matches) = batch.into_documents(&row_ids, &match_ids);
        state.credits.extend(credits);
        state.matches.extend(matches);
        Ok(row_ids)
    }

    async fn insert_group_credit_batch(&self, batch: GroupCreditBatch) -> DaoResult<Vec<u64>> {
        batch.validate()?;
        let mut state = self.state.write();
        let row_ids = state.take_ids(batch.rows.len());
        let rows = batch.into_documents(&row_ids);
        state.group_credits.extend(rows);
        Ok(row_ids)
    }
}
