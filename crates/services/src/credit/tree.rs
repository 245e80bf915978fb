use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use callqi_db::LevelType;
use callqi_db::models::SegmentMatch;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CreditError, CreditItem};
use crate::catalog::SettingLookup;
use crate::dao::CreditStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNode {
    pub credit: CreditItem,
    /// Tag evidence, only on segment rows under a sentence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<SegmentMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CreditNode>,
}

impl CreditNode {
    fn walk<'a>(&'a self, out: &mut Vec<&'a CreditNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }

    fn walk_mut(&mut self, f: &mut impl FnMut(&mut CreditNode)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }
}

/// The credit tree written by one scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryCredit {
    pub create_time: i64,
    pub roots: Vec<CreditNode>,
}

impl HistoryCredit {
    pub fn call(&self) -> Option<&CreditNode> {
        self.roots.iter().find(|n| n.credit.level == LevelType::Call)
    }

    /// Total of the run: the call root's score, or the roots' sum without one.
    pub fn score(&self) -> i32 {
        match self.call() {
            Some(root) => root.credit.score,
            None => self.roots.iter().map(|n| n.credit.score).sum(),
        }
    }

    /// Every node, parents before children.
    pub fn nodes(&self) -> Vec<&CreditNode> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.walk(&mut out);
        }
        out
    }

    pub fn find(&self, level: LevelType, org_id: u64) -> Option<&CreditNode> {
        self.nodes()
            .into_iter()
            .find(|n| n.credit.level == level && n.credit.org_id == org_id)
    }
}

/// Rebuilds credit trees from flat rows, one per run, newest first.
///
/// Within a run, children are ordered by level then id, and a sentence's
/// segment rows are deduplicated by segment.
pub fn build_history(rows: Vec<CreditItem>) -> Result<Vec<HistoryCredit>, CreditError> {
    let mut buckets: BTreeMap<i64, Vec<CreditItem>> = BTreeMap::new();
    for row in rows {
        buckets.entry(row.create_time).or_default().push(row);
    }
    buckets
        .into_iter()
        .rev()
        .map(|(create_time, rows)| build_bucket(create_time, rows))
        .collect()
}

fn build_bucket(create_time: i64, mut rows: Vec<CreditItem>) -> Result<HistoryCredit, CreditError> {
    rows.sort_by_key(|r| (r.level, r.id));
    let levels: HashMap<u64, LevelType> = rows.iter().map(|r| (r.id, r.level)).collect();

    let mut roots = Vec::new();
    let mut children: HashMap<u64, Vec<CreditItem>> = HashMap::new();
    for row in rows {
        if row.parent_id == 0 {
            if !row.level.can_be_root() {
                return Err(CreditError::MissingParent {
                    id: row.id,
                    parent_id: 0,
                });
            }
            roots.push(row);
            continue;
        }
        let Some(&parent_level) = levels.get(&row.parent_id) else {
            return Err(CreditError::MissingParent {
                id: row.id,
                parent_id: row.parent_id,
            });
        };
        if !parent_level.accepts_child(row.level) {
            return Err(CreditError::UnexpectedParent {
                id: row.id,
                level: row.level,
                parent_level,
            });
        }
        children.entry(row.parent_id).or_default().push(row);
    }

    let roots = roots
        .into_iter()
        .map(|root| assemble(root, &mut children))
        .collect();
    Ok(HistoryCredit { create_time, roots })
}

fn assemble(credit: CreditItem, children: &mut HashMap<u64, Vec<CreditItem>>) -> CreditNode {
    let kids = children.remove(&credit.id).unwrap_or_default();
    let mut seen_segments = HashSet::new();
    let kids = kids
        .into_iter()
        .filter(|k| k.level != LevelType::Segment || seen_segments.insert(k.org_id))
        .map(|k| assemble(k, children))
        .collect();
    CreditNode {
        credit,
        matches: Vec::new(),
        children: kids,
    }
}

/// Rows of a history, parents before children. Rebuilding them gives the
/// same history back.
pub fn flatten(history: &HistoryCredit) -> Vec<CreditItem> {
    history
        .nodes()
        .into_iter()
        .map(|n| n.credit.clone())
        .collect()
}

/// Hangs each sentence's tag evidence on its segment rows. Only matches of
/// the same call, run, rule family and sentence tags are attached.
pub fn attach_matches(
    histories: &mut [HistoryCredit],
    matches: &[SegmentMatch],
    sentence_tags: &HashMap<u64, Vec<u64>>,
) {
    for history in histories.iter_mut() {
        for root in history.roots.iter_mut() {
            root.walk_mut(&mut |node| {
                let level = node.credit.level;
                if level != LevelType::Sentence && !level.is_exception_sentence() {
                    return;
                }
                let Some(tags) = sentence_tags.get(&node.credit.org_id) else {
                    return;
                };
                for child in node.children.iter_mut() {
                    if child.credit.level != LevelType::Segment {
                        continue;
                    }
                    let mut seen = HashSet::new();
                    child.matches = matches
                        .iter()
                        .filter(|m| {
                            m.call_id == child.credit.call_id
                                && m.seg_id == child.credit.org_id
                                && m.create_time == child.credit.create_time
                                && m.whos == child.credit.whos
                                && tags.contains(&m.tag_id)
                                && seen.insert(m.tag_id)
                        })
                        .cloned()
                        .collect();
                }
            });
        }
    }
}

/// Every scoring run of a call, newest first, with tag evidence attached.
pub async fn retrieve_credit(
    store: &dyn CreditStore,
    lookup: &dyn SettingLookup,
    call_id: u64,
) -> Result<Vec<HistoryCredit>, CreditError> {
    let rows = store.call_credits(call_id).await?;
    let row_count = rows.len();
    let mut histories = build_history(rows.into_iter().map(CreditItem::from).collect())?;

    let mut seg_ids = BTreeSet::new();
    let mut sentence_ids = BTreeSet::new();
    for history in &histories {
        for node in history.nodes() {
            let level = node.credit.level;
            if level == LevelType::Segment {
                seg_ids.insert(node.credit.org_id);
            } else if level == LevelType::Sentence || level.is_exception_sentence() {
                sentence_ids.insert(node.credit.org_id);
            }
        }
    }

    if !seg_ids.is_empty() {
        let seg_ids: Vec<u64> = seg_ids.into_iter().collect();
        let sentence_ids: Vec<u64> = sentence_ids.into_iter().collect();
        let matches = store.segment_matches(call_id, &seg_ids).await?;
        let tags = lookup.sentence_tags(&sentence_ids).await?;
        attach_matches(&mut histories, &matches, &tags);
    }

    debug!(
        call_id,
        rows = row_count,
        runs = histories.len(),
        "Credit history retrieved"
    );
    Ok(histories)
}
