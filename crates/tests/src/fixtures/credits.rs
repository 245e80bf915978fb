use callqi_db::models::{SegmentMatch, SimpleCredit};
use callqi_db::{CreditValid, LevelType, Whos};

pub fn row(
    id: u64,
    parent_id: u64,
    level: LevelType,
    org_id: u64,
    create_time: i64,
    score: i32,
) -> SimpleCredit {
    SimpleCredit {
        id,
        call_id: 77,
        level,
        parent_id,
        org_id,
        valid: CreditValid::Matched,
        revise: CreditValid::Unactivated,
        score,
        whos: Whos::Conversation,
        create_time,
        update_time: create_time,
    }
}

pub fn segment_match(id: u64, seg_id: u64, tag_id: u64, create_time: i64) -> SegmentMatch {
    SegmentMatch {
        id,
        call_id: 77,
        seg_id,
        tag_id,
        score: 88,
        matched: "late".into(),
        matched_text: "my order is late".into(),
        create_time,
        whos: Whos::Conversation,
    }
}

/// Two scoring runs of call 77: 9 rows at t=1000 and 10 rows at t=2000,
/// each spanning rule group, rule, flow, sentence group and sentence.
pub fn two_runs() -> Vec<SimpleCredit> {
    use LevelType::*;
    vec![
        row(1, 0, RuleGroup, 1, 1000, 7),
        row(2, 1, Rule, 30, 1000, 10),
        row(3, 1, Rule, 31, 1000, -3),
        row(4, 2, ConversationFlow, 20, 1000, 0),
        row(5, 3, ConversationFlow, 21, 1000, 0),
        row(6, 4, SentenceGroup, 10, 1000, 0),
        row(7, 5, SentenceGroup, 12, 1000, 0),
        row(8, 6, Sentence, 1, 1000, 0),
        row(9, 7, Sentence, 4, 1000, 0),
        row(11, 0, RuleGroup, 1, 2000, 12),
        row(12, 11, Rule, 30, 2000, 10),
        row(13, 11, Rule, 31, 2000, 2),
        row(14, 12, ConversationFlow, 20, 2000, 0),
        row(15, 13, ConversationFlow, 21, 2000, 0),
        row(16, 14, SentenceGroup, 10, 2000, 0),
        row(17, 15, SentenceGroup, 12, 2000, 0),
        row(18, 16, Sentence, 1, 2000, 0),
        row(19, 17, Sentence, 4, 2000, 0),
        row(20, 16, Sentence, 2, 2000, 0),
    ]
}
