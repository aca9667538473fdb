/// Engine tuning: detection windows and the odds of random story events.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::history::DEFAULT_CONTRADICTION_HORIZON;
use crate::schema::player::{DEFAULT_PLAYER_NAME, DEFAULT_START_LOCATION};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("{field} must be a probability in 0..=1, got {value}")]
    Probability { field: &'static str, value: f64 },
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub player_name: String,
    pub start_location: String,
    /// Verbs compared per half when looking for repeated actions.
    pub action_loop_window: usize,
    /// Recent node visits searched for a repeating run.
    pub node_loop_window: usize,
    /// History entries scanned for contradicting actions.
    pub contradiction_horizon: usize,
    pub resolution_surreal_chance: f64,
    pub loop_break_surreal_chance: f64,
    pub advance_surreal_chance: f64,
    pub item_grant_chance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            player_name: DEFAULT_PLAYER_NAME.to_string(),
            start_location: DEFAULT_START_LOCATION.to_string(),
            action_loop_window: 5,
            node_loop_window: 10,
            contradiction_horizon: DEFAULT_CONTRADICTION_HORIZON,
            resolution_surreal_chance: 0.4,
            loop_break_surreal_chance: 0.3,
            advance_surreal_chance: 0.15,
            item_grant_chance: 0.2,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate. Omitted fields keep their defaults.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("resolution_surreal_chance", self.resolution_surreal_chance),
            ("loop_break_surreal_chance", self.loop_break_surreal_chance),
            ("advance_surreal_chance", self.advance_surreal_chance),
            ("item_grant_chance", self.item_grant_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { field, value });
            }
        }
        for (field, min, value) in [
            ("action_loop_window", 2, self.action_loop_window),
            ("node_loop_window", 4, self.node_loop_window),
            ("contradiction_horizon", 1, self.contradiction_horizon),
        ] {
            if value < min {
                return Err(ConfigError::TooSmall { field, min, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.player_name, "Traveler");
        assert_eq!(config.action_loop_window, 5);
        assert_eq!(config.node_loop_window, 10);
        assert_eq!(config.contradiction_horizon, 20);
    }

    #[test]
    fn partial_ron_keeps_defaults() {
        let config = EngineConfig::parse_ron("(player_name: \"Ada\", item_grant_chance: 1.0)").unwrap();
        assert_eq!(config.player_name, "Ada");
        assert_eq!(config.item_grant_chance, 1.0);
        assert_eq!(config.start_location, "the beginning");
        assert_eq!(config.resolution_surreal_chance, 0.4);
    }

    #[test]
    fn rejects_bad_probability() {
        let err = EngineConfig::parse_ron("(advance_surreal_chance: 1.5)").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Probability { field: "advance_surreal_chance", .. }
        ));
    }

    #[test]
    fn rejects_tiny_window() {
        let err = EngineConfig::parse_ron("(node_loop_window: 2)").unwrap_err();
        assert!(matches!(err, ConfigError::TooSmall { field: "node_loop_window", .. }));
    }

    #[test]
    fn rejects_malformed_ron() {
        assert!(matches!(
            EngineConfig::parse_ron("(player_name: )"),
            Err(ConfigError::Ron(_))
        ));
    }
}
