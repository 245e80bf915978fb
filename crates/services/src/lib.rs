pub mod catalog;
pub mod credit;
pub mod dao;
pub mod dialogue;
pub mod engine;
pub mod matching;
pub mod rules;
pub mod telemetry;
pub mod timeline;

pub use engine::{CallScore, GroupScore, ScoreRequest, ScoringEngine, ScoringError};
