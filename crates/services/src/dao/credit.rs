use async_trait::async_trait;
use bson::{Document, doc};
use callqi_db::indexes::COUNTERS;
use callqi_db::models::{CallGroup, CreditCallGroup, SegmentMatch, SimpleCredit};
use callqi_db::{CreditValid, LevelType, Whos};
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{Client, ClientSession, Database};
use tracing::{info, warn};

use super::base::{DaoError, DaoResult};

/// A credit row waiting to be stored. Parents are referenced by their index
/// in the same batch; the store assigns real ids.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub parent: Option<usize>,
    /// Scored call, or for group rows the member call that decided them.
    pub call_id: u64,
    pub level: LevelType,
    pub org_id: u64,
    pub valid: CreditValid,
    pub revise: CreditValid,
    pub score: i32,
    pub whos: Whos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSegmentMatch {
    pub seg_id: u64,
    pub tag_id: u64,
    pub score: i32,
    pub matched: String,
    pub matched_text: String,
    pub whos: Whos,
}

/// One scoring run of a call: the credit tree plus its tag evidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreditBatch {
    pub call_id: u64,
    pub create_time: i64,
    pub rows: Vec<BatchRow>,
    pub matches: Vec<NewSegmentMatch>,
}

impl CreditBatch {
    pub fn validate(&self) -> DaoResult<()> {
        validate_rows(&self.rows)
    }

    /// Turns the batch into documents given the ids handed out for its rows
    /// and matches, in batch order.
    pub fn into_documents(
        self,
        row_ids: &[u64],
        match_ids: &[u64],
    ) -> (Vec<SimpleCredit>, Vec<SegmentMatch>) {
        let credits = self
            .rows
            .iter()
            .zip(row_ids)
            .map(|(row, &id)| SimpleCredit {
                id,
                call_id: self.call_id,
                level: row.level,
                parent_id: row.parent.map(|p| row_ids[p]).unwrap_or(0),
                org_id: row.org_id,
                valid: row.valid,
                revise: row.revise,
                score: row.score,
                whos: row.whos,
                create_time: self.create_time,
                update_time: self.create_time,
            })
            .collect();
        let matches = self
            .matches
            .into_iter()
            .zip(match_ids)
            .map(|(m, &id)| SegmentMatch {
                id,
                call_id: self.call_id,
                seg_id: m.seg_id,
                tag_id: m.tag_id,
                score: m.score,
                matched: m.matched,
                matched_text: m.matched_text,
                create_time: self.create_time,
                whos: m.whos,
            })
            .collect();
        (credits, matches)
    }
}

/// One reconciliation run of a call group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCreditBatch {
    pub call_group_id: u64,
    pub create_time: i64,
    pub rows: Vec<BatchRow>,
}

impl GroupCreditBatch {
    pub fn validate(&self) -> DaoResult<()> {
        validate_rows(&self.rows)
    }

    pub fn into_documents(self, row_ids: &[u64]) -> Vec<CreditCallGroup> {
        self.rows
            .iter()
            .zip(row_ids)
            .map(|(row, &id)| CreditCallGroup {
                id,
                call_group_id: self.call_group_id,
                call_id: row.call_id,
                level: row.level,
                parent_id: row.parent.map(|p| row_ids[p]).unwrap_or(0),
                org_id: row.org_id,
                valid: row.valid,
                revise: row.revise,
                score: row.score,
                create_time: self.create_time,
                update_time: self.create_time,
            })
            .collect()
    }
}

/// Parents come first and every parent/child pair is a legal level pairing.
fn validate_rows(rows: &[BatchRow]) -> DaoResult<()> {
    for (idx, row) in rows.iter().enumerate() {
        match row.parent {
            None if !row.level.can_be_root() => {
                return Err(DaoError::Validation(format!(
                    "row {idx} of level {} has no parent",
                    row.level.code()
                )));
            }
            None => {}
            Some(parent) if parent >= idx => {
                return Err(DaoError::Validation(format!(
                    "row {idx} references parent {parent} that does not precede it"
                )));
            }
            Some(parent) => {
                let parent_level = rows[parent].level;
                if !parent_level.accepts_child(row.level) {
                    return Err(DaoError::Validation(format!(
                        "row {idx} of level {} cannot hang under level {}",
                        row.level.code(),
                        parent_level.code()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Persistence of credit trees and the call-group membership they read.
#[async_trait]
pub trait CreditStore: Send + Sync + 'static {
    /// Every credit row of a call across all runs.
    async fn call_credits(&self, call_id: u64) -> DaoResult<Vec<SimpleCredit>>;

    async fn group_credits(&self, call_group_id: u64) -> DaoResult<Vec<CreditCallGroup>>;

    /// Tag evidence stored for the given segments of one call.
    async fn segment_matches(&self, call_id: u64, seg_ids: &[u64])
    -> DaoResult<Vec<SegmentMatch>>;

    /// Active member calls of a group; empty for unknown or deleted groups.
    async fn group_members(&self, call_group_id: u64) -> DaoResult<Vec<u64>>;

    /// Stores a call's run atomically. Returns the ids given to its rows.
    async fn insert_credit_batch(&self, batch: CreditBatch) -> DaoResult<Vec<u64>>;

    async fn insert_group_credit_batch(&self, batch: GroupCreditBatch) -> DaoResult<Vec<u64>>;
}

pub struct MongoCreditStore {
    client: Client,
    db: Database,
}

impl MongoCreditStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    /// Reserves `count` consecutive ids of a collection's sequence.
    async fn reserve_ids(
        &self,
        session: &mut ClientSession,
        collection: &str,
        count: usize,
    ) -> DaoResult<Vec<u64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let counter = self
            .db
            .collection::<Document>(COUNTERS)
            .find_one_and_update(
                doc! { "_id": collection },
                doc! { "$inc": { "seq": count as i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await?
            .ok_or_else(|| DaoError::Transaction(format!("counter {collection} missing")))?;
        let last = counter
            .get_i64("seq")
            .map_err(|e| DaoError::Transaction(e.to_string()))? as u64;
        let first = last + 1 - count as u64;
        Ok((first..=last).collect())
    }

    async fn write_credit_batch(
        &self,
        session: &mut ClientSession,
        batch: CreditBatch,
    ) -> DaoResult<Vec<u64>> {
        let row_ids = self
            .reserve_ids(session, SimpleCredit::COLLECTION, batch.rows.len())
            .await?;
        let match_ids = self
            .reserve_ids(session, SegmentMatch::COLLECTION, batch.matches.len())
            .await?;
        let (credits, matches) = batch.into_documents(&row_ids, &match_ids);

        if !credits.is_empty() {
            self.db
                .collection::<SimpleCredit>(SimpleCredit::COLLECTION)
                .insert_many(credits)
                .session(&mut *session)
                .await?;
        }
        if !matches.is_empty() {
            self.db
                .collection::<SegmentMatch>(SegmentMatch::COLLECTION)
                .insert_many(matches)
                .session(&mut *session)
                .await?;
        }
        Ok(row_ids)
    }

    async fn write_group_batch(
        &self,
        session: &mut ClientSession,
        batch: GroupCreditBatch,
    ) -> DaoResult<Vec<u64>> {
        let row_ids = self
            .reserve_ids(session, CreditCallGroup::COLLECTION, batch.rows.len())
            .await?;
        let rows = batch.into_documents(&row_ids);
        if !rows.is_empty() {
            self.db
                .collection::<CreditCallGroup>(CreditCallGroup::COLLECTION)
                .insert_many(rows)
                .session(&mut *session)
                .await?;
        }
        Ok(row_ids)
    }

    async fn finish<T>(session: &mut ClientSession, result: DaoResult<T>) -> DaoResult<T> {
        match result {
            Ok(value) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| DaoError::Transaction(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(error = %abort, "Transaction abort failed");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl CreditStore for MongoCreditStore {
    async fn call_credits(&self, call_id: u64) -> DaoResult<Vec<SimpleCredit>> {
        let cursor = self
            .db
            .collection::<SimpleCredit>(SimpleCredit::COLLECTION)
            .find(doc! { "call_id": call_id as i64 })
            .sort(doc! { "create_time": -1, "type": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn group_credits(&self, call_group_id: u64) -> DaoResult<Vec<CreditCallGroup>> {
        let cursor = self
            .db
            .collection::<CreditCallGroup>(CreditCallGroup::COLLECTION)
            .find(doc! { "call_group_id": call_group_id as i64 })
            .sort(doc! { "create_time": -1, "type": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn segment_matches(
        &self,
        call_id: u64,
        seg_ids: &[u64],
    ) -> DaoResult<Vec<SegmentMatch>> {
        if seg_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = seg_ids.iter().map(|id| *id as i64).collect();
        let cursor = self
            .db
            .collection::<SegmentMatch>(SegmentMatch::COLLECTION)
            .find(doc! { "call_id": call_id as i64, "seg_id": { "$in": ids } })
            .sort(doc! { "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn group_members(&self, call_group_id: u64) -> DaoResult<Vec<u64>> {
        let group = self
            .db
            .collection::<CallGroup>(CallGroup::COLLECTION)
            .find_one(doc! { "_id": call_group_id as i64 })
            .await?;
        Ok(group.map(|g| g.active_members().to_vec()).unwrap_or_default())
    }

    async fn insert_credit_batch(&self, batch: CreditBatch) -> DaoResult<Vec<u64>> {
        batch.validate()?;
        let call_id = batch.call_id;
        let rows = batch.rows.len();

        let mut session = self.client.start_session().await?;
        session
            .start_transaction()
            .await
            .map_err(|e| DaoError::Transaction(e.to_string()))?;
        let result = self.write_credit_batch(&mut session, batch).await;
        let ids = Self::finish(&mut session, result).await?;

        info!(call_id, rows, "Credit batch stored");
        Ok(ids)
    }

    async fn insert_group_credit_batch(&self, batch: GroupCreditBatch) -> DaoResult<Vec<u64>> {
        batch.validate()?;
        let call_group_id = batch.call_group_id;
        let rows = batch.rows.len();

        let mut session = self.client.start_session().await?;
        session
            .start_transaction()
            .await
            .map_err(|e| DaoError::Transaction(e.to_string()))?;
        let result = self.write_group_batch(&mut session, batch).await;
        let ids = Self::finish(&mut session, result).await?;

        info!(call_group_id, rows, "Call-group credit batch stored");
        Ok(ids)
    }
}
