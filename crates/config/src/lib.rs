use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Default location of the optional settings file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/callqi.toml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "CALLQI_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub predictor: PredictorSettings,
    pub scoring: ScoringSettings,
    pub timeline: TimelineSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "callqi".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            name: "callqi".to_string(),
        }
    }
}

/// Connection to the NLP tag predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorSettings {
    /// Base URL; `/batch_predict` is appended per request.
    pub url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:15001".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Knobs for one scoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Number of concurrent predictor workers per tag-match round.
    pub concurrency: usize,
    /// Minimum predictor score (0-100) for a tag to count as matched.
    pub threshold: i32,
    /// Deadline for one tag-match round, in seconds.
    pub timeout_secs: u64,
    /// Score every call starts from before rule contributions.
    pub base_score: i32,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            threshold: 60,
            timeout_secs: 30 * 60,
            base_score: 100,
        }
    }
}

/// Segment timeline construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Same-channel sentences closer than this (seconds) are merged.
    pub merge_gap_secs: f64,
    /// A merge is refused once the combined text would reach this many characters.
    pub max_segment_chars: usize,
    /// Shortest gap (seconds) that is filled with a silence segment.
    pub min_silence_secs: f64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            merge_gap_secs: 3.0,
            max_segment_chars: 256,
            min_silence_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads `.env`, then layers defaults, the settings file and `CALLQI__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Same layering as [`Settings::load`] with an explicit settings file.
    /// A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("CALLQI")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.concurrency == 0 {
            return Err(ConfigError::Message(
                "scoring.concurrency must be at least 1".into(),
            ));
        }
        if !(0..=100).contains(&self.scoring.threshold) {
            return Err(ConfigError::Message(format!(
                "scoring.threshold must be within 0..=100, got {}",
                self.scoring.threshold
            )));
        }
        if self.scoring.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "scoring.timeout_secs must be larger than zero".into(),
            ));
        }
        if self.timeline.merge_gap_secs < 0.0 || self.timeline.min_silence_secs < 0.0 {
            return Err(ConfigError::Message(
                "timeline gaps must not be negative".into(),
            ));
        }
        Ok(())
    }
}
