//! Concurrent tag matching of a call's spoken segments against the predictor,
//! and the criteria that turn tag hits into sentence, sentence-group and rule matches.

pub mod criteria;
pub mod predictor;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use predictor::{
    AttrResult, HttpPredictor, PredictError, PredictResult, PredictSentence, Predictor,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No tags or sentences to match")]
    NoArgument,
    #[error("Tag match timeout must be larger than zero")]
    InvalidTimeout,
    /// The deadline passed; the results collected so far are kept.
    #[error("Tag match deadline exceeded")]
    DeadlineExceeded(Vec<MatchedData>),
    /// The caller cancelled the round; the results collected so far are kept.
    #[error("Tag match cancelled")]
    Cancelled(Vec<MatchedData>),
    /// A predictor call failed and the round was stopped; the results
    /// collected before that are kept.
    #[error("Batch predict failed for tag {tag}")]
    Predictor {
        tag: u64,
        #[source]
        source: PredictError,
        partial: Vec<MatchedData>,
    },
}

impl DispatchError {
    /// Partial results of an interrupted round.
    pub fn partial(&self) -> Option<&[MatchedData]> {
        match self {
            DispatchError::DeadlineExceeded(data)
            | DispatchError::Cancelled(data)
            | DispatchError::Predictor { partial: data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn into_partial(self) -> Option<Vec<MatchedData>> {
        match self {
            DispatchError::DeadlineExceeded(data)
            | DispatchError::Cancelled(data)
            | DispatchError::Predictor { partial: data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Tags one sentence of the batch matched. Workers write concurrently, one
/// entry per tag.
#[derive(Debug, Default)]
pub struct MatchedData {
    /// 1-based position of the sentence in the batch.
    pub index: usize,
    matched: Mutex<HashMap<u64, AttrResult>>,
}

impl MatchedData {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            matched: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a sentence result from known hits.
    pub fn with_hits(index: usize, hits: impl IntoIterator<Item = (u64, AttrResult)>) -> Self {
        Self {
            index,
            matched: Mutex::new(hits.into_iter().collect()),
        }
    }

    pub fn set(&self, tag_id: u64, result: AttrResult) {
        self.matched.lock().insert(tag_id, result);
    }

    pub fn get(&self, tag_id: u64) -> Option<AttrResult> {
        self.matched.lock().get(&tag_id).cloned()
    }

    pub fn tag_ids(&self) -> BTreeSet<u64> {
        self.matched.lock().keys().copied().collect()
    }

    /// Hits ordered by tag id.
    pub fn hits(&self) -> Vec<(u64, AttrResult)> {
        let mut hits: Vec<(u64, AttrResult)> = self
            .matched
            .lock()
            .iter()
            .map(|(tag, r)| (*tag, r.clone()))
            .collect();
        hits.sort_by_key(|(tag, _)| *tag);
        hits
    }

    pub fn is_empty(&self) -> bool {
        self.matched.lock().is_empty()
    }

    fn snapshot(&self) -> Self {
        Self {
            index: self.index,
            matched: Mutex::new(self.matched.lock().clone()),
        }
    }
}

impl Clone for MatchedData {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

/// Runs tag-match rounds with a bounded pool of predictor workers.
pub struct TagMatcher {
    predictor: Arc<dyn Predictor>,
    concurrency: usize,
    threshold: i32,
}

impl TagMatcher {
    pub fn new(predictor: Arc<dyn Predictor>, concurrency: usize, threshold: i32) -> Self {
        Self {
            predictor,
            concurrency: concurrency.max(1),
            threshold,
        }
    }

    /// Matches every sentence against every tag within `timeout`.
    pub async fn tag_match(
        &self,
        tags: &[u64],
        sentences: &[String],
        timeout: Duration,
    ) -> Result<Vec<MatchedData>, DispatchError> {
        self.tag_match_with_cancel(tags, sentences, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`TagMatcher::tag_match`], also stopping when `cancel` fires.
    ///
    /// Each distinct tag is sent to the predictor once for the whole batch.
    /// The first failed predictor call stops every worker and fails the round.
    pub async fn tag_match_with_cancel(
        &self,
        tags: &[u64],
        sentences: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<MatchedData>, DispatchError> {
        if tags.is_empty() || sentences.is_empty() {
            return Err(DispatchError::NoArgument);
        }
        if timeout.is_zero() {
            return Err(DispatchError::InvalidTimeout);
        }

        let mut ordered = tags.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        let num_tags = ordered.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(ordered)));

        let batch = Arc::new(PredictSentence::batch(sentences));
        let collected: Arc<Vec<MatchedData>> =
            Arc::new((1..=sentences.len()).map(MatchedData::new).collect());
        let token = cancel.child_token();
        let failure: Arc<Mutex<Option<(u64, PredictError)>>> = Arc::new(Mutex::new(None));

        let mut workers = JoinSet::new();
        for worker in 0..self.concurrency.min(num_tags) {
            workers.spawn(run_worker(
                worker,
                self.predictor.clone(),
                self.threshold,
                queue.clone(),
                batch.clone(),
                collected.clone(),
                failure.clone(),
                token.clone(),
            ));
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut expired = false;
        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(error = %e, "Tag match worker aborted"),
                    None => break,
                },
                _ = &mut deadline, if !expired => {
                    expired = true;
                    token.cancel();
                    warn!(?timeout, tags = num_tags, "Tag match deadline exceeded");
                }
            }
        }

        let interrupted = token.is_cancelled();
        let failed = failure.lock().take();
        let results = Arc::try_unwrap(collected)
            .unwrap_or_else(|shared| shared.iter().map(MatchedData::snapshot).collect());

        if let Some((tag, source)) = failed {
            return Err(DispatchError::Predictor {
                tag,
                source,
                partial: results,
            });
        }
        if expired {
            return Err(DispatchError::DeadlineExceeded(results));
        }
        if interrupted {
            return Err(DispatchError::Cancelled(results));
        }
        info!(
            tags = num_tags,
            sentences = results.len(),
            "Tag match round finished"
        );
        Ok(results)
    }
}

async fn run_worker(
    worker: usize,
    predictor: Arc<dyn Predictor>,
    threshold: i32,
    queue: Arc<Mutex<VecDeque<u64>>>,
    batch: Arc<Vec<PredictSentence>>,
    collected: Arc<Vec<MatchedData>>,
    failure: Arc<Mutex<Option<(u64, PredictError)>>>,
    token: CancellationToken,
) {
    loop {
        if token.is_cancelled() {
            return;
        }
        let next = queue.lock().pop_front();
        let Some(tag_id) = next else {
            return;
        };

        let result = tokio::select! {
            _ = token.cancelled() => return,
            r = predictor.batch_predict(tag_id, threshold, &batch) => r,
        };

        match result {
            Ok(result) => {
                let mut hits = 0usize;
                for hit in result.hits() {
                    // sentence ids are 1-based batch positions
                    if hit.sentence_id == 0 || hit.sentence_id > collected.len() {
                        continue;
                    }
                    collected[hit.sentence_id - 1].set(tag_id, hit.clone());
                    hits += 1;
                }
                debug!(worker, tag_id, hits, "Tag matched");
            }
            Err(e) => {
                error!(worker, tag_id, error = %e, "Batch predict failed, stopping round");
                failure.lock().get_or_insert((tag_id, e));
                token.cancel();
                return;
            }
        }
    }
}
