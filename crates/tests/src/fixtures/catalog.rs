use callqi_services::catalog::StaticCatalog;

use super::predictor::ScriptedPredictor;

pub const RULE_GROUP: u64 = 1;

/// Rule group 1:
/// - rule 30 (+10): staff greets, then staff says goodbye
/// - rule 31 (-5, negative): the customer must not complain
/// - silence 40 (-3): no silence over 10s, unless staff asked to hold before it
/// - silence 41 (-2): no silence over 4s
/// - speed 50 (+5): staff speed within 3..=6
/// - interposal 60 (-4): no talk-over longer than 0.5s
pub const CATALOG: &str = r#"{
    "rule_groups": [
        {"id": 1, "uuid": "rg-service", "rule_ids": [30, 31],
         "silence_rule_ids": [40, 41], "speed_rule_ids": [50], "interposal_rule_ids": [60]},
        {"id": 2, "uuid": "rg-broken", "rule_ids": [32]}
    ],
    "rules": [
        {"id": 30, "uuid": "r-greet-bye", "score": 10, "flow_ids": [20]},
        {"id": 31, "uuid": "r-no-complaint", "score": -5, "method": "negative", "flow_ids": [21]},
        {"id": 32, "uuid": "r-broken", "score": 1, "flow_ids": [22]}
    ],
    "flows": [
        {"id": 20, "uuid": "f-greet-bye", "expression": "must greet then bye",
         "sentence_group_ids": [10, 11]},
        {"id": 21, "uuid": "f-complaint", "expression": "must complaint",
         "sentence_group_ids": [12]},
        {"id": 22, "uuid": "f-broken", "expression": "greet and and bye",
         "sentence_group_ids": [10, 11]}
    ],
    "sentence_groups": [
        {"id": 10, "uuid": "greet", "role": "staff", "sentence_ids": [1]},
        {"id": 11, "uuid": "bye", "role": "staff", "sentence_ids": [2]},
        {"id": 12, "uuid": "complaint", "role": "customer", "sentence_ids": [4]}
    ],
    "sentences": [
        {"id": 1, "uuid": "s-greet", "tag_ids": [100, 101]},
        {"id": 2, "uuid": "s-bye", "tag_ids": [200]},
        {"id": 3, "uuid": "s-hold", "tag_ids": [300]},
        {"id": 4, "uuid": "s-complaint", "tag_ids": [400]}
    ],
    "silence_rules": [
        {"id": 40, "score": -3, "seconds": 10.0, "times": 0,
         "exception": {"before": {"staff": ["s-hold", "s-missing"]}}},
        {"id": 41, "score": -2, "seconds": 4.0, "times": 0}
    ],
    "speed_rules": [
        {"id": 50, "score": 5, "min": 3.0, "max": 6.0}
    ],
    "interposal_rules": [
        {"id": 60, "score": -4, "seconds": 0.5, "times": 0}
    ]
}"#;

pub fn catalog() -> StaticCatalog {
    StaticCatalog::from_json_str(CATALOG).unwrap()
}

/// Keyword predictor for the tags [`CATALOG`] uses.
pub fn predictor() -> ScriptedPredictor {
    ScriptedPredictor::new()
        .tag(100, &["hello"])
        .tag(101, &["thank you"])
        .tag(200, &["goodbye"])
        .tag(300, &["hold on"])
        .tag(400, &["late", "broken"])
}
