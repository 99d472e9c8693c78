//! Configuration module - environment variable parsing and per-contestant settings

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::race::assist::DriveAssist;
use crate::race::player::{select_control_set, BindingError, ControlSet, KeyCode};
use crate::race::session::SessionMode;

/// Host configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Ranking rules
    pub mode: SessionMode,
    /// Laps to finish in race mode
    pub laps: u32,
    /// Number of AI contestants on the grid
    pub ai_count: usize,
    /// AI difficulty, 0..1
    pub ai_difficulty: f32,
    /// Seed for AI skill spread; random when unset
    pub seed: Option<u64>,
    /// Session length in time mode (seconds)
    pub time_limit_secs: u64,
    /// JSON circuit to load instead of the generated stadium
    pub circuit_path: Option<PathBuf>,
    /// Replay history per contestant (seconds, 0 disables)
    pub replay_seconds: f32,
    /// Display unit for speeds
    pub speed_unit: SpeedUnit,
}

impl HostConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let ai_difficulty: f32 = parse_or("AI_DIFFICULTY", 0.8)?;
        if !(0.0..=1.0).contains(&ai_difficulty) {
            return Err(ConfigError::Invalid("AI_DIFFICULTY"));
        }
        let replay_seconds: f32 = parse_or("REPLAY_SECONDS", 10.0)?;
        if !replay_seconds.is_finite() || replay_seconds < 0.0 {
            return Err(ConfigError::Invalid("REPLAY_SECONDS"));
        }

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            mode: parse_or("RACE_MODE", SessionMode::Race)?,
            laps: parse_or("RACE_LAPS", 3)?,
            ai_count: parse_or("AI_COUNT", 5)?,
            ai_difficulty,
            seed: match env::var("RACE_SEED") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid("RACE_SEED"))?),
                Err(_) => None,
            },
            time_limit_secs: parse_or("TIME_LIMIT_SECS", 120)?,
            circuit_path: env::var("CIRCUIT_PATH").ok().map(PathBuf::from),
            replay_seconds,
            speed_unit: parse_or("SPEED_UNIT", SpeedUnit::Kmh)?,
        })
    }

    /// Contestant settings implied by this configuration
    pub fn settings(&self) -> Settings {
        Settings {
            speed_unit: self.speed_unit,
            ai_difficulty: self.ai_difficulty,
            replay_seconds: self.replay_seconds,
            ..Settings::default()
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

/// Unit speeds are shown in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Kmh,
    Mph,
}

impl SpeedUnit {
    /// Convert m/s into this unit
    pub fn convert(&self, mps: f32) -> f32 {
        match self {
            Self::Kmh => mps * 3.6,
            Self::Mph => mps * 2.236_936,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Kmh => "km/h",
            Self::Mph => "mph",
        }
    }
}

impl FromStr for SpeedUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kmh" | "km/h" | "kph" => Ok(Self::Kmh),
            "mph" => Ok(Self::Mph),
            _ => Err(ConfigError::Invalid("SPEED_UNIT")),
        }
    }
}

/// Settings a contestant is built with. Each contestant keeps its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Key binding sets, each listing accelerate, brake, left, right, gear up, gear down
    pub control_sets: Vec<Vec<KeyCode>>,
    /// Assists for human players
    pub assist: DriveAssist,
    pub speed_unit: SpeedUnit,
    pub ai_difficulty: f32,
    /// Replay history length (seconds, 0 disables)
    pub replay_seconds: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            control_sets: vec![
                ControlSet::arrows().keys().to_vec(),
                ControlSet::wasd().keys().to_vec(),
            ],
            assist: DriveAssist::default(),
            speed_unit: SpeedUnit::Kmh,
            ai_difficulty: 0.8,
            replay_seconds: 0.0,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Binding set by index
    pub fn control_set(&self, index: usize) -> Result<ControlSet, BindingError> {
        select_control_set(&self.control_sets, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_have_two_control_sets() {
        let settings = Settings::default();
        assert_eq!(settings.control_set(0).unwrap(), ControlSet::arrows());
        assert_eq!(settings.control_set(1).unwrap(), ControlSet::wasd());
        assert!(settings.control_set(2).is_err());
    }

    #[test]
    fn settings_parse_from_partial_json() {
        let settings = Settings::from_json(
            r#"{"control_sets": [[1, 2, 3, 4, 5]], "speed_unit": "mph", "replay_seconds": 5}"#,
        )
        .unwrap();
        assert_eq!(settings.speed_unit, SpeedUnit::Mph);
        assert_eq!(settings.replay_seconds, 5.0);
        assert_eq!(settings.assist, DriveAssist::default());
        assert_eq!(
            settings.control_set(0),
            Err(BindingError::WrongLength { found: 5, expected: 6 })
        );
    }

    #[test]
    fn speed_units_convert() {
        assert!((SpeedUnit::Kmh.convert(10.0) - 36.0).abs() < 1e-4);
        assert!((SpeedUnit::Mph.convert(10.0) - 22.369).abs() < 1e-2);
        assert_eq!("MPH".parse::<SpeedUnit>().unwrap(), SpeedUnit::Mph);
        assert!("knots".parse::<SpeedUnit>().is_err());
        assert_eq!(SpeedUnit::Kmh.label(), "km/h");
        assert_eq!(SpeedUnit::Mph.label(), "mph");
    }
}
