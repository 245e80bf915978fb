use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::{CallGroup, CreditCallGroup, SegmentMatch, SimpleCredit};

/// Collection holding the per-collection id sequences.
pub const COUNTERS: &str = "counters";

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Call credits: read by call, bucketed by run, linked by parent
    create_indexes(
        db,
        SimpleCredit::COLLECTION,
        vec![
            index(bson::doc! { "call_id": 1, "create_time": -1 }),
            index(bson::doc! { "parent_id": 1 }),
            index(bson::doc! { "call_id": 1, "type": 1 }),
        ],
    )
    .await?;

    // Call-group credits
    create_indexes(
        db,
        CreditCallGroup::COLLECTION,
        vec![
            index(bson::doc! { "call_group_id": 1, "create_time": -1 }),
            index(bson::doc! { "parent_id": 1 }),
        ],
    )
    .await?;

    // Tag evidence, read per call by segment
    create_indexes(
        db,
        SegmentMatch::COLLECTION,
        vec![index(
            bson::doc! { "call_id": 1, "seg_id": 1, "create_time": -1 },
        )],
    )
    .await?;

    // Call groups: a call belongs to at most one active group
    create_indexes(
        db,
        CallGroup::COLLECTION,
        vec![index_unique_sparse(bson::doc! { "call_ids": 1, "is_delete": 1 })],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique_sparse(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).sparse(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    match coll.create_indexes(indexes.clone()).await {
        Ok(_) => {
            info!(collection, "Indexes created");
            Ok(())
        }
        Err(e) => {
            // IndexKeySpecsConflict (code 86): same name, different options.
            // Drop and recreate.
            if let mongodb::error::ErrorKind::Command(ref cmd_err) = *e.kind {
                if cmd_err.code == 86 {
                    tracing::warn!(
                        collection,
                        "Index conflict detected, dropping conflicting indexes and retrying"
                    );
                    coll.drop_indexes().await?;
                    coll.create_indexes(indexes).await?;
                    info!(collection, "Indexes recreated after conflict resolution");
                    return Ok(());
                }
            }
            Err(e)
        }
    }
}
