//! Configuration module
//!
//! Handles bot settings, the screen layout registry and the runtime flags
//! the operator can change while the bot runs.

pub mod layout;
pub mod runtime;
pub mod settings;

use std::path::PathBuf;

pub use layout::{Layout, Point, Region, Templates};
pub use runtime::BotConfig;
pub use settings::{
    EconomySettings, MatchSettings, Settings, StuckRecovery, StuckSettings, TimingSettings,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
