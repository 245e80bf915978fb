use std::collections::HashMap;

use callqi_db::models::RuleMethod;
use callqi_db::{CreditValid, LevelType};
use tracing::debug;

use super::tree::{HistoryCredit, build_history, retrieve_credit};
use super::{CreditError, CreditItem, whos_of};
use crate::catalog::SettingLookup;
use crate::dao::{BatchRow, CreditStore, GroupCreditBatch};
use crate::rules::gated_score;

/// Latest scoring run of one member call.
#[derive(Debug, Clone)]
pub struct MemberCredits {
    pub call_id: u64,
    pub history: HistoryCredit,
}

/// How a rule is decided across calls: a positive rule holds when any
/// member call satisfied it, a negative one only when all of them did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RulePolicy {
    pub method: RuleMethod,
    pub score: i32,
}

struct Outcome {
    call_id: u64,
    valid: bool,
    score: i32,
}

/// Reconciles the member calls' rule outcomes into one group credit tree:
/// call-group root, rule groups and rules.
///
/// `policies` is keyed by rule level and rule id. Rules without a policy are
/// treated as positive, scored with the first non-zero score the members
/// stored for them.
pub fn reconcile_group(
    call_group_id: u64,
    create_time: i64,
    base_score: i32,
    members: &[MemberCredits],
    policies: &HashMap<(LevelType, u64), RulePolicy>,
) -> Result<GroupCreditBatch, CreditError> {
    if members.is_empty() {
        return Err(CreditError::NoMemberCalls(call_group_id));
    }

    // rule group -> (rule level, rule id) -> outcome per member, first-seen order
    let mut groups: Vec<(u64, Vec<((LevelType, u64), Vec<Outcome>)>)> = Vec::new();
    for member in members {
        let rule_groups = match member.history.call() {
            Some(root) => root.children.iter().collect::<Vec<_>>(),
            None => member.history.roots.iter().collect(),
        };
        for rule_group in rule_groups
            .into_iter()
            .filter(|n| n.credit.level == LevelType::RuleGroup)
        {
            let group_id = rule_group.credit.org_id;
            let pos = match groups.iter().position(|(id, _)| *id == group_id) {
                Some(pos) => pos,
                None => {
                    groups.push((group_id, Vec::new()));
                    groups.len() - 1
                }
            };
            let rules = &mut groups[pos].1;
            for rule in &rule_group.children {
                let key = (rule.credit.level, rule.credit.org_id);
                let outcome = Outcome {
                    call_id: member.call_id,
                    valid: rule.credit.valid.is_matched(),
                    score: rule.credit.score,
                };
                match rules.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, outcomes)) => outcomes.push(outcome),
                    None => rules.push((key, vec![outcome])),
                }
            }
        }
    }

    let mut rows = vec![BatchRow {
        parent: None,
        call_id: 0,
        level: LevelType::Call,
        org_id: call_group_id,
        valid: CreditValid::Unactivated,
        revise: CreditValid::Unactivated,
        score: base_score,
        whos: whos_of(LevelType::Call),
    }];
    let mut total = base_score;

    for (group_id, rules) in groups {
        let group_idx = rows.len();
        rows.push(BatchRow {
            parent: Some(0),
            call_id: 0,
            level: LevelType::RuleGroup,
            org_id: group_id,
            valid: CreditValid::Unactivated,
            revise: CreditValid::Unactivated,
            score: 0,
            whos: whos_of(LevelType::RuleGroup),
        });
        let mut group_score = 0;

        for ((level, rule_id), outcomes) in rules {
            let policy = policies.get(&(level, rule_id)).copied().unwrap_or(RulePolicy {
                method: RuleMethod::Positive,
                score: outcomes
                    .iter()
                    .map(|o| o.score)
                    .find(|s| *s != 0)
                    .unwrap_or(0),
            });
            let (valid, decided_by) = match policy.method {
                RuleMethod::Positive => {
                    let decider = outcomes.iter().find(|o| o.valid);
                    (decider.is_some(), decider.map(|o| o.call_id))
                }
                RuleMethod::Negative => {
                    let decider = outcomes.iter().find(|o| !o.valid);
                    (decider.is_none(), decider.map(|o| o.call_id))
                }
            };
            let score = gated_score(policy.score, valid);
            debug!(
                call_group_id,
                rule_id,
                level = level.code(),
                valid,
                score,
                "Group rule reconciled"
            );
            rows.push(BatchRow {
                parent: Some(group_idx),
                call_id: decided_by.unwrap_or(0),
                level,
                org_id: rule_id,
                valid: CreditValid::from_bool(valid),
                revise: CreditValid::Unactivated,
                score,
                whos: whos_of(level),
            });
            group_score += score;
        }

        rows[group_idx].score = group_score;
        total += group_score;
    }
    rows[0].score = total;

    Ok(GroupCreditBatch {
        call_group_id,
        create_time,
        rows,
    })
}

/// Credit history of a call group, newest first. A group with a single
/// member call reports that call's own history.
pub async fn retrieve_grouped_credit(
    store: &dyn CreditStore,
    lookup: &dyn SettingLookup,
    call_group_id: u64,
) -> Result<Vec<HistoryCredit>, CreditError> {
    let members = store.group_members(call_group_id).await?;
    match members.as_slice() {
        [] => Err(CreditError::NoMemberCalls(call_group_id)),
        [only] => retrieve_credit(store, lookup, *only).await,
        _ => {
            let rows = store.group_credits(call_group_id).await?;
            build_history(rows.into_iter().map(CreditItem::from).collect())
        }
    }
}
