use std::sync::Arc;

use callqi_config::{ScoringSettings, TimelineSettings};
use callqi_db::models::{AsrResponse, ChannelRoles};
use callqi_services::dao::MemoryCreditStore;
use callqi_services::matching::Predictor;
use callqi_services::{ScoreRequest, ScoringEngine};

use super::catalog::{RULE_GROUP, catalog};

/// A scoring engine over the fixture catalog and an in-memory store.
pub struct TestEngine {
    pub engine: Arc<ScoringEngine>,
    pub store: Arc<MemoryCreditStore>,
}

impl TestEngine {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self::with_scoring(predictor, ScoringSettings::default())
    }

    pub fn with_scoring(predictor: Arc<dyn Predictor>, scoring: ScoringSettings) -> Self {
        let store = Arc::new(MemoryCreditStore::new());
        let engine = Arc::new(ScoringEngine::new(
            store.clone(),
            predictor,
            Arc::new(catalog()),
            scoring,
            TimelineSettings::default(),
        ));
        Self { engine, store }
    }

    /// Staff on the left, scored against the fixture rule group.
    pub fn request(asr: AsrResponse) -> ScoreRequest {
        ScoreRequest {
            asr,
            roles: ChannelRoles::default(),
            rule_group_ids: vec![RULE_GROUP],
        }
    }
}
