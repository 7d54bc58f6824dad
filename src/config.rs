//! Tunable game constants, stored as the single row of `game_config`

use serde::{Deserialize, Serialize};
use spacetimedb::SpacetimeType;

use crate::error::ConfigError;

/// Arc/chapter grid plus the stall and failover timers
#[derive(SpacetimeType, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub num_arcs: u32,
    pub chapters_per_arc: u32,

    /// Delay before the host may skip players stalling for the first time
    pub first_stall_secs: u64,

    /// Delay before confirmed dropouts are skipped automatically
    pub dropout_stall_secs: u64,

    /// How long the host may sit on an all-answered chapter before the successor can take over
    pub host_failover_secs: u64,

    /// Flat multiplier applied to an impact when the player revealed the hint
    pub hint_multiplier: f64,

    pub min_group_players: u32,
    pub leaderboard_limit: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            num_arcs: 3,
            chapters_per_arc: 4,
            first_stall_secs: 30,
            dropout_stall_secs: 5,
            host_failover_secs: 30,
            hint_multiplier: 0.7,
            min_group_players: 2,
            leaderboard_limit: 50,
        }
    }
}

impl GameConfig {
    pub fn total_chapters(&self) -> u32 {
        self.num_arcs * self.chapters_per_arc
    }

    pub fn last_chapter_index(&self) -> u32 {
        self.chapters_per_arc.saturating_sub(1)
    }

    pub fn last_arc_index(&self) -> u32 {
        self.num_arcs.saturating_sub(1)
    }

    /// Parse and validate a config document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_arcs == 0 {
            return Err(ConfigError::Invalid { field: "num_arcs", reason: "must be at least 1".into() });
        }
        if self.chapters_per_arc == 0 {
            return Err(ConfigError::Invalid { field: "chapters_per_arc", reason: "must be at least 1".into() });
        }
        if !(self.hint_multiplier > 0.0 && self.hint_multiplier <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "hint_multiplier",
                reason: format!("must be in (0, 1], got {}", self.hint_multiplier),
            });
        }
        if self.min_group_players < 2 {
            return Err(ConfigError::Invalid { field: "min_group_players", reason: "must be at least 2".into() });
        }
        if self.leaderboard_limit == 0 {
            return Err(ConfigError::Invalid { field: "leaderboard_limit", reason: "must be at least 1".into() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_grid() {
        let config = GameConfig::default();
        assert_eq!(config.total_chapters(), 12);
        assert_eq!(config.last_chapter_index(), 3);
        assert_eq!(config.last_arc_index(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = GameConfig::from_json(r#"{"num_arcs": 2, "first_stall_secs": 45}"#).unwrap();
        assert_eq!(config.num_arcs, 2);
        assert_eq!(config.first_stall_secs, 45);
        assert_eq!(config.chapters_per_arc, 4);
        assert_eq!(config.dropout_stall_secs, 5);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(GameConfig::from_json(r#"{"num_arcs": 0}"#).is_err());
        assert!(GameConfig::from_json(r#"{"hint_multiplier": 1.5}"#).is_err());
        assert!(GameConfig::from_json(r#"{"hint_multiplier": 0}"#).is_err());
        assert!(GameConfig::from_json(r#"{"min_group_players": 1}"#).is_err());
        assert!(GameConfig::from_json("not json").is_err());
    }
}
