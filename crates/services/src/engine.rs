use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use callqi_config::{ScoringSettings, TimelineSettings};
use callqi_db::LevelType;
use callqi_db::models::{AsrResponse, Channel, ChannelRoles, RuleMethod};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{LookupError, SettingLookup};
use crate::credit::{
    self, CreditError, HistoryCredit, MemberCredits, RulePolicy, credit_batch, reconcile_group,
};
use crate::dao::{CreditStore, DaoError};
use crate::matching::{DispatchError, MatchedData, Predictor, TagMatcher};
use crate::rules::{
    ConversationPlan, RuleError, RuleGroupCredit, RulesException, SilenceCheck, SpeedCheck,
    check_interposal, check_silence, check_speed,
};
use crate::timeline;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Call {0} is already being scored")]
    AlreadyScoring(u64),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Credit(#[from] CreditError),
    #[error(transparent)]
    Dao(#[from] DaoError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// One call to score.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub asr: AsrResponse,
    pub roles: ChannelRoles,
    pub rule_group_ids: Vec<u64>,
}

/// Outcome of a stored scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct CallScore {
    pub call_id: u64,
    pub create_time: i64,
    pub score: i32,
    /// Ids of the stored credit rows, call root first.
    pub credit_ids: Vec<u64>,
    pub rule_groups: Vec<RuleGroupCredit>,
    pub exceptions: Vec<RulesException>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupScore {
    pub call_group_id: u64,
    pub create_time: i64,
    pub score: i32,
    pub credit_ids: Vec<u64>,
}

/// A rule group ready to run: compiled flows plus resolved exceptions.
struct GroupPlan {
    conversation: ConversationPlan,
    silence: Vec<SilenceCheck>,
    speed: Vec<SpeedCheck>,
}

impl GroupPlan {
    fn tag_ids(&self) -> BTreeSet<u64> {
        let mut tags = self.conversation.tag_ids();
        let exception_tags = self
            .silence
            .iter()
            .map(|c| &c.exceptions)
            .chain(self.speed.iter().map(|c| &c.exceptions))
            .flat_map(|e| e.criteria.values().flatten().copied());
        tags.extend(exception_tags);
        tags
    }
}

/// Scores calls and call groups end to end and stores the credit trees.
///
/// Created once and shared via `Arc`. A call can only be scored by one
/// caller at a time.
pub struct ScoringEngine {
    store: Arc<dyn CreditStore>,
    predictor: Arc<dyn Predictor>,
    lookup: Arc<dyn SettingLookup>,
    scoring: ScoringSettings,
    timeline: TimelineSettings,
    in_flight: DashSet<u64>,
    /// Last run stamp per call and per call group.
    call_stamps: DashMap<u64, i64>,
    group_stamps: DashMap<u64, i64>,
}

/// Millisecond stamp of a new run, strictly after the previous run of `id`
/// so that back-to-back runs never share a history bucket.
fn next_stamp(stamps: &DashMap<u64, i64>, id: u64) -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = stamps.entry(id).or_insert(0);
    *last = now.max(*last + 1);
    *last
}

struct InFlight<'a> {
    calls: &'a DashSet<u64>,
    call_id: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.calls.remove(&self.call_id);
    }
}

impl ScoringEngine {
    pub fn new(
        store: Arc<dyn CreditStore>,
        predictor: Arc<dyn Predictor>,
        lookup: Arc<dyn SettingLookup>,
        scoring: ScoringSettings,
        timeline: TimelineSettings,
    ) -> Self {
        info!(
            concurrency = scoring.concurrency,
            threshold = scoring.threshold,
            timeout_secs = scoring.timeout_secs,
            "Scoring engine created"
        );
        Self {
            store,
            predictor,
            lookup,
            scoring,
            timeline,
            in_flight: DashSet::new(),
            call_stamps: DashMap::new(),
            group_stamps: DashMap::new(),
        }
    }

    pub fn is_scoring(&self, call_id: u64) -> bool {
        self.in_flight.contains(&call_id)
    }

    fn claim(&self, call_id: u64) -> Result<InFlight<'_>, ScoringError> {
        if !self.in_flight.insert(call_id) {
            return Err(ScoringError::AlreadyScoring(call_id));
        }
        Ok(InFlight {
            calls: &self.in_flight,
            call_id,
        })
    }

    async fn plan(&self, rule_group_ids: &[u64]) -> Result<Vec<GroupPlan>, ScoringError> {
        let mut settings = Vec::with_capacity(rule_group_ids.len());
        for id in rule_group_ids {
            settings.push(self.lookup.rule_group(*id).await?);
        }

        let uuids: Vec<String> = settings
            .iter()
            .flat_map(|s| {
                let silence = s.silence_rules.iter().flat_map(SilenceCheck::exception_uuids);
                let speed = s.speed_rules.iter().flat_map(SpeedCheck::exception_uuids);
                silence.chain(speed).cloned().collect::<Vec<_>>()
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sentences = if uuids.is_empty() {
            Vec::new()
        } else {
            self.lookup.sentences_by_uuid(&uuids).await?
        };

        let mut plans = Vec::with_capacity(settings.len());
        for setting in settings {
            let silence = setting
                .silence_rules
                .iter()
                .cloned()
                .map(|rule| SilenceCheck::resolve(rule, &sentences))
                .collect();
            let speed = setting
                .speed_rules
                .iter()
                .cloned()
                .map(|rule| SpeedCheck::resolve(rule, &sentences))
                .collect();
            plans.push(GroupPlan {
                conversation: ConversationPlan::compile(setting)?,
                silence,
                speed,
            });
        }
        Ok(plans)
    }

    /// Scores one call against its rule groups and stores the run as one
    /// credit batch.
    ///
    /// An interrupted or failed tag-match round fails the run; nothing is
    /// stored.
    pub async fn score_call(&self, request: ScoreRequest) -> Result<CallScore, ScoringError> {
        let call_id = request.asr.call_id;
        let _guard = self.claim(call_id)?;

        let plans = self.plan(&request.rule_group_ids).await?;
        let timeline = timeline::build_timeline(&request.asr, request.roles, &self.timeline);
        let spoken = timeline::spoken(&timeline);

        let tags: Vec<u64> = plans
            .iter()
            .flat_map(GroupPlan::tag_ids)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let matched = if tags.is_empty() || spoken.is_empty() {
            (1..=spoken.len()).map(MatchedData::new).collect()
        } else {
            let texts: Vec<String> = spoken.iter().map(|s| s.segment.text.clone()).collect();
            TagMatcher::new(
                self.predictor.clone(),
                self.scoring.concurrency,
                self.scoring.threshold,
            )
            .tag_match(&tags, &texts, Duration::from_secs(self.scoring.timeout_secs))
            .await?
        };
        debug!(
            call_id,
            segments = timeline.len(),
            spoken = spoken.len(),
            tags = tags.len(),
            "Tag match complete"
        );

        let staff_speed = match request.roles.staff_channel() {
            Channel::Right => request.asr.right_channel.speed,
            _ => request.asr.left_channel.speed,
        };

        let mut rule_groups = Vec::with_capacity(plans.len());
        let mut exceptions = Vec::new();
        for plan in &plans {
            let group_id = plan.conversation.setting().group.id;
            rule_groups.push(plan.conversation.evaluate(&spoken, &matched)?);
            exceptions.extend(check_silence(group_id, &plan.silence, &timeline, &matched)?);
            exceptions.extend(check_speed(
                group_id,
                &plan.speed,
                &timeline,
                &matched,
                staff_speed,
            )?);
            exceptions.extend(check_interposal(
                group_id,
                &plan.conversation.setting().interposal_rules,
                &timeline,
            ));
        }

        let create_time = next_stamp(&self.call_stamps, call_id);
        let batch = credit_batch(
            call_id,
            create_time,
            self.scoring.base_score,
            &rule_groups,
            &exceptions,
        );
        let score = batch.rows.first().map(|r| r.score).unwrap_or_default();
        let rows = batch.rows.len();
        let credit_ids = self.store.insert_credit_batch(batch).await?;

        info!(call_id, score, rows, "Call scored");
        Ok(CallScore {
            call_id,
            create_time,
            score,
            credit_ids,
            rule_groups,
            exceptions,
        })
    }

    /// Reconciles the latest run of every member call into a call-group
    /// credit tree and stores it.
    pub async fn score_call_group(
        &self,
        call_group_id: u64,
        rule_group_ids: &[u64],
    ) -> Result<GroupScore, ScoringError> {
        let member_ids = self.store.group_members(call_group_id).await?;
        let mut members = Vec::with_capacity(member_ids.len());
        for call_id in member_ids {
            let histories =
                credit::retrieve_credit(self.store.as_ref(), self.lookup.as_ref(), call_id)
                    .await?;
            match histories.into_iter().next() {
                Some(history) => members.push(MemberCredits { call_id, history }),
                None => warn!(call_group_id, call_id, "Member call has no credit, skipped"),
            }
        }

        let mut policies = HashMap::new();
        for id in rule_group_ids {
            let setting = self.lookup.rule_group(*id).await?;
            for rule in &setting.rules {
                policies.insert(
                    (LevelType::Rule, rule.id),
                    RulePolicy {
                        method: rule.method,
                        score: rule.score,
                    },
                );
            }
            let positive = |score| RulePolicy {
                method: RuleMethod::Positive,
                score,
            };
            for rule in &setting.silence_rules {
                policies.insert((LevelType::SilenceRule, rule.id), positive(rule.score));
            }
            for rule in &setting.speed_rules {
                policies.insert((LevelType::SpeedRule, rule.id), positive(rule.score));
            }
            for rule in &setting.interposal_rules {
                policies.insert((LevelType::InterposalRule, rule.id), positive(rule.score));
            }
        }

        let create_time = next_stamp(&self.group_stamps, call_group_id);
        let batch = reconcile_group(
            call_group_id,
            create_time,
            self.scoring.base_score,
            &members,
            &policies,
        )?;
        let score = batch.rows.first().map(|r| r.score).unwrap_or_default();
        let credit_ids = self.store.insert_group_credit_batch(batch).await?;

        info!(
            call_group_id,
            members = members.len(),
            score,
            "Call group scored"
        );
        Ok(GroupScore {
            call_group_id,
            create_time,
            score,
            credit_ids,
        })
    }

    pub async fn retrieve_credit(&self, call_id: u64) -> Result<Vec<HistoryCredit>, ScoringError> {
        Ok(credit::retrieve_credit(self.store.as_ref(), self.lookup.as_ref(), call_id).await?)
    }

    pub async fn retrieve_grouped_credit(
        &self,
        call_group_id: u64,
    ) -> Result<Vec<HistoryCredit>, ScoringError> {
        Ok(credit::retrieve_grouped_credit(
            self.store.as_ref(),
            self.lookup.as_ref(),
            call_group_id,
        )
        .await?)
    }
}
