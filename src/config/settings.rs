//! Bot settings
//!
//! Timings, thresholds and recovery policy. Everything that differs between
//! deployments of the bot lives here as data, never as separate code paths.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Layout};

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Troop created during battle at startup (1-3)
    pub unit_to_create: u8,
    /// Whether production upgrades are enabled at startup
    pub upgrade_production: bool,
    /// Android package of the driven application
    pub package_name: String,
    /// What to do when the screen stops changing
    pub recovery: StuckRecovery,
    /// Restart the application after this many seconds (None = never)
    pub session_restart_secs: Option<u64>,
    /// Template matching settings
    pub matching: MatchSettings,
    /// Stuck detection settings
    pub stuck: StuckSettings,
    /// Economy heuristic settings
    pub economy: EconomySettings,
    /// Screen timing settings
    pub timings: TimingSettings,
    /// Tap coordinates, OCR regions and template names
    pub layout: Layout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unit_to_create: 2,
            upgrade_production: true,
            package_name: "com.vjsjlqvlmp.wearewarriors".to_string(),
            recovery: StuckRecovery::Restart,
            session_restart_secs: Some(3600),
            matching: MatchSettings::default(),
            stuck: StuckSettings::default(),
            economy: EconomySettings::default(),
            timings: TimingSettings::default(),
            layout: Layout::default(),
        }
    }
}

impl Settings {
    /// Full restart on stuck, skills after 9 seconds
    pub fn classic() -> Self {
        Self::default()
    }

    /// Clear history on stuck, skills after 7.5 seconds
    pub fn light() -> Self {
        Self {
            recovery: StuckRecovery::ClearHistory,
            session_restart_secs: None,
            timings: TimingSettings {
                skill_delay_ms: 7500,
                settle_ms: 1000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "classic" => Some(Self::classic()),
            "light" => Some(Self::light()),
            _ => None,
        }
    }

    /// Load settings from a JSON file. Missing keys take their default value.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse settings from a JSON string
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the control loop cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.threshold must be within 0..=1, got {}",
                self.matching.threshold
            )));
        }
        if self.stuck.min_frames < 2 || self.stuck.min_frames > self.stuck.history_capacity {
            return Err(ConfigError::Invalid(format!(
                "stuck.min_frames must be within 2..={}, got {}",
                self.stuck.history_capacity, self.stuck.min_frames
            )));
        }
        if self.economy.evolve_income_ratio <= 0.0 {
            return Err(ConfigError::Invalid(
                "economy.evolve_income_ratio must be positive".to_string(),
            ));
        }
        if self.layout.skills.is_empty() {
            return Err(ConfigError::Invalid(
                "layout.skills must list at least one tap".to_string(),
            ));
        }
        Ok(())
    }
}

/// Recovery applied when the stuck detector fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckRecovery {
    /// Force-stop and relaunch the application, then reinitialize in place
    Restart,
    /// Drop the frame history and keep going
    ClearHistory,
}

/// Template matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Minimum correlation accepted as a match (inclusive)
    pub threshold: f32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self { threshold: 0.7 }
    }
}

/// Stuck detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StuckSettings {
    /// Frames kept in history
    pub history_capacity: usize,
    /// Frames required before detection runs
    pub min_frames: usize,
    /// Correlation above which two frames count as the same screen
    pub similarity: f32,
}

impl Default for StuckSettings {
    fn default() -> Self {
        Self {
            history_capacity: 60,
            min_frames: 50,
            similarity: 0.95,
        }
    }
}

/// Economy heuristic settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomySettings {
    /// Evolve cost, in battles worth of income, above which upgrades are bought
    pub evolve_income_ratio: f64,
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            evolve_income_ratio: 20.0,
        }
    }
}

/// Timing settings for screen interactions (all in milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Period of the capture schedule
    pub capture_period_ms: u64,
    /// Oldest history frame the decision loop accepts before capturing itself
    pub frame_max_age_ms: u64,
    /// Battle time before the skill sequence is cast
    pub skill_delay_ms: u64,
    /// Gap between the taps of the skill sequence
    pub skill_tap_interval_ms: u64,
    /// Wait after closing the battle result
    pub settle_ms: u64,
    /// Time allowed to find a start-battle control
    pub entry_timeout_ms: u64,
    /// Time allowed for the battle to start after tapping start
    pub start_timeout_ms: u64,
    /// Pause between start-battle taps
    pub start_tap_interval_ms: u64,
    /// Wait after opening the upgrade menu or tapping evolve
    pub menu_open_ms: u64,
    /// Wait after switching upgrade tabs
    pub tab_switch_ms: u64,
    /// Duration of the long-press that buys production upgrades
    pub upgrade_hold_ms: u32,
    /// Poll period while paused
    pub pause_poll_ms: u64,
    /// Wait after force-stopping the application
    pub stop_wait_ms: u64,
    /// Wait after launching the application
    pub launch_wait_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            capture_period_ms: 20,
            frame_max_age_ms: 250,
            skill_delay_ms: 9000,
            skill_tap_interval_ms: 250,
            settle_ms: 2000,
            entry_timeout_ms: 10_000,
            start_timeout_ms: 10_000,
            start_tap_interval_ms: 1000,
            menu_open_ms: 300,
            tab_switch_ms: 100,
            upgrade_hold_ms: 2000,
            pause_poll_ms: 100,
            stop_wait_ms: 2000,
            launch_wait_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.unit_to_create, 2);
        assert_eq!(settings.matching.threshold, 0.7);
        assert_eq!(settings.stuck.history_capacity, 60);
        assert_eq!(settings.recovery, StuckRecovery::Restart);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_presets_differ_only_in_data() {
        let classic = Settings::classic();
        let light = Settings::light();
        assert_eq!(classic.timings.skill_delay_ms, 9000);
        assert_eq!(light.timings.skill_delay_ms, 7500);
        assert_eq!(light.recovery, StuckRecovery::ClearHistory);
        assert!(Settings::preset("light").is_some());
        assert!(Settings::preset("turbo").is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            Settings::from_json(r#"{"recovery":"clear_history","timings":{"skill_delay_ms":7500}}"#)
                .unwrap();
        assert_eq!(settings.recovery, StuckRecovery::ClearHistory);
        assert_eq!(settings.timings.skill_delay_ms, 7500);
        assert_eq!(settings.timings.settle_ms, 2000);
        assert_eq!(settings.timings.skill_tap_interval_ms, 250);
        assert_eq!(settings.layout.templates.in_battle, "is-in-battle");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = Settings::from_json(r#"{"matching":{"threshold":1.5}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            Settings::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
