use std::time::Duration;

use async_trait::async_trait;
use callqi_config::PredictorSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Invalid predict request: {0}")]
    InvalidRequest(String),
    #[error("Predictor request failed: {0}")]
    Request(String),
    #[error("Predictor returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Predictor response decode failed: {0}")]
    Decode(String),
}

/// One sentence of a batch, numbered 1-based within the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictSentence {
    pub sentence_id: usize,
    pub sentence: String,
}

impl PredictSentence {
    /// Numbers `texts` 1-based in order.
    pub fn batch<S: AsRef<str>>(texts: &[S]) -> Vec<Self> {
        texts
            .iter()
            .enumerate()
            .map(|(idx, text)| Self {
                sentence_id: idx + 1,
                sentence: text.as_ref().to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct BatchPredictRequest<'a> {
    /// Every tag is served as its own predictor application.
    app_id: String,
    threshold: i32,
    data: &'a [PredictSentence],
}

/// A sentence the predictor matched against one tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrResult {
    pub sentence_id: usize,
    #[serde(default)]
    pub sentence: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub tag: String,
    #[serde(rename = "match", default, skip_serializing_if = "String::is_empty")]
    pub matched: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub threshold: i32,
    /// Logic-rule predictions; not used for scoring.
    #[serde(default)]
    pub logic_results: Vec<serde_json::Value>,
    #[serde(default)]
    pub dialogue_act_results: Vec<AttrResult>,
    #[serde(default)]
    pub user_response_results: Vec<AttrResult>,
    #[serde(default)]
    pub keyword_results: Vec<AttrResult>,
}

impl PredictResult {
    /// Dialogue-act, keyword and user-response hits, in that order.
    pub fn hits(&self) -> impl Iterator<Item = &AttrResult> {
        self.dialogue_act_results
            .iter()
            .chain(self.keyword_results.iter())
            .chain(self.user_response_results.iter())
    }
}

/// External NLP service that scores a batch of sentences against one tag.
#[async_trait]
pub trait Predictor: Send + Sync + 'static {
    async fn batch_predict(
        &self,
        tag_id: u64,
        threshold: i32,
        sentences: &[PredictSentence],
    ) -> Result<PredictResult, PredictError>;
}

/// [`Predictor`] over the service's HTTP `batch_predict` endpoint.
pub struct HttpPredictor {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPredictor {
    pub fn new(settings: &PredictorSettings) -> Result<Self, PredictError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| PredictError::Request(e.to_string()))?;
        Ok(Self {
            endpoint: format!("{}/batch_predict", settings.url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn batch_predict(
        &self,
        tag_id: u64,
        threshold: i32,
        sentences: &[PredictSentence],
    ) -> Result<PredictResult, PredictError> {
        if threshold < 0 {
            return Err(PredictError::InvalidRequest(format!(
                "negative threshold {threshold}"
            )));
        }
        if sentences.is_empty() {
            return Err(PredictError::InvalidRequest("no sentences".to_string()));
        }

        let request = BatchPredictRequest {
            app_id: tag_id.to_string(),
            threshold,
            data: sentences,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| PredictError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PredictError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: PredictResult = resp
            .json()
            .await
            .map_err(|e| PredictError::Decode(e.to_string()))?;
        debug!(
            tag_id,
            hits = result.hits().count(),
            "Batch predict finished"
        );
        Ok(result)
    }
}
