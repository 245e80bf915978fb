pub mod grouped;
pub mod persist;
pub mod tree;

use callqi_db::models::{CreditCallGroup, SimpleCredit};
use callqi_db::{CreditValid, LevelType, Whos};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::LookupError;
use crate::dao::DaoError;

pub use grouped::{MemberCredits, RulePolicy, reconcile_group, retrieve_grouped_credit};
pub use persist::credit_batch;
pub use tree::{CreditNode, HistoryCredit, build_history, flatten, retrieve_credit};

#[derive(Debug, Error)]
pub enum CreditError {
    #[error("Credit {id} references missing parent {parent_id}")]
    MissingParent { id: u64, parent_id: u64 },
    #[error("Credit {id} of level {level:?} cannot hang under level {parent_level:?}")]
    UnexpectedParent {
        id: u64,
        level: LevelType,
        parent_level: LevelType,
    },
    #[error("Call group {0} has no member calls")]
    NoMemberCalls(u64),
    #[error(transparent)]
    Dao(#[from] DaoError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// A stored credit row of either a call or a call group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditItem {
    pub id: u64,
    pub parent_id: u64,
    pub level: LevelType,
    pub org_id: u64,
    /// Scored call; for group rows, the member call that decided the row.
    pub call_id: u64,
    pub valid: CreditValid,
    pub revise: CreditValid,
    pub score: i32,
    pub whos: Whos,
    pub create_time: i64,
}

impl From<SimpleCredit> for CreditItem {
    fn from(c: SimpleCredit) -> Self {
        Self {
            id: c.id,
            parent_id: c.parent_id,
            level: c.level,
            org_id: c.org_id,
            call_id: c.call_id,
            valid: c.valid,
            revise: c.revise,
            score: c.score,
            whos: c.whos,
            create_time: c.create_time,
        }
    }
}

impl From<CreditCallGroup> for CreditItem {
    fn from(c: CreditCallGroup) -> Self {
        Self {
            id: c.id,
            parent_id: c.parent_id,
            level: c.level,
            org_id: c.org_id,
            call_id: c.call_id,
            valid: c.valid,
            revise: c.revise,
            score: c.score,
            whos: whos_of(c.level),
            create_time: c.create_time,
        }
    }
}

/// Rule family implied by a rule level; conversation otherwise.
pub fn whos_of(level: LevelType) -> Whos {
    match level {
        LevelType::SilenceRule => Whos::Silence,
        LevelType::SpeedRule => Whos::Speed,
        LevelType::InterposalRule => Whos::Interposal,
        _ => Whos::Conversation,
    }
}
