pub mod indexes;
pub mod level;
pub mod models;

pub use level::{CreditValid, LevelCodeError, LevelType, SensitiveKind, Whos};
