//! Session configuration: where the campaign starts and how playback is paced.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted pause between two replayed commands.
pub const MAX_STEP_DELAY_MS: u64 = 10_000;

/// Tunables for a mission session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Level loaded by `MissionSession::start`.
    pub start_level: u32,
    /// Pause after each replayed command, for human-observable pacing.
    pub step_delay_ms: u64,
    /// Seed for random fragment placement (`None` = entropy).
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_level: 1,
            step_delay_ms: 350,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Same config with no pacing delay.
    pub fn unpaced(mut self) -> Self {
        self.step_delay_ms = 0;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Levels are numbered from 1.
    StartLevelZero,
    StepDelayTooLong(u64),
}

/// Validate a session configuration, returning all errors found.
pub fn validate_config(config: &SessionConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    if config.start_level == 0 {
        errors.push(ConfigError::StartLevelZero);
    }
    if config.step_delay_ms > MAX_STEP_DELAY_MS {
        errors.push(ConfigError::StepDelayTooLong(config.step_delay_ms));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(validate_config(&config).is_empty());
        assert_eq!(config.step_delay(), Duration::from_millis(350));
    }

    #[test]
    fn invalid_values_are_all_reported() {
        let config = SessionConfig {
            start_level: 0,
            step_delay_ms: 60_000,
            seed: None,
        };
        let errors = validate_config(&config);
        assert!(errors.contains(&ConfigError::StartLevelZero));
        assert!(errors.contains(&ConfigError::StepDelayTooLong(60_000)));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"seed": 9}"#).unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.start_level, 1);
        assert_eq!(config.step_delay_ms, 350);
    }

    #[test]
    fn builders() {
        let config = SessionConfig::default().unpaced().with_seed(4);
        assert_eq!(config.step_delay(), Duration::ZERO);
        assert_eq!(config.seed, Some(4));
    }
}
