use serde::{Deserialize, Serialize};

/// Result document produced by the ASR service for one stereo call recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsrResponse {
    #[serde(default)]
    pub version: f64,
    /// Non-zero when recognition failed for the whole file.
    #[serde(rename = "ret", default)]
    pub status: i64,
    pub call_id: u64,
    #[serde(default)]
    pub call_uuid: String,
    /// Recording length in seconds.
    #[serde(default)]
    pub length: f64,
    pub left_channel: AsrChannel,
    pub right_channel: AsrChannel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsrChannel {
    /// Talk speed (characters per minute) measured on this channel.
    #[serde(default)]
    pub speed: f64,
    /// Total quiet time on this channel, in seconds.
    #[serde(default)]
    pub quiet: f64,
    #[serde(default)]
    pub emotion: f64,
    #[serde(default)]
    pub sentences: Vec<AsrSentence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsrSentence {
    /// Per-sentence recognition status; 200 is success.
    #[serde(rename = "sret")]
    pub status: i64,
    pub start: f64,
    pub end: f64,
    #[serde(rename = "asr", default)]
    pub text: String,
    /// Angry-emotion score.
    #[serde(default)]
    pub emotion: f64,
    #[serde(default)]
    pub segment_id: i64,
}

impl AsrSentence {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            status: super::STATUS_OK,
            start,
            end,
            text: text.into(),
            emotion: 0.0,
            segment_id: 0,
        }
    }
}
