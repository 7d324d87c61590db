//! Crossroad configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::global_variables::{DEFAULT_DWELL_MS, DEFAULT_GREEN_MS, DEFAULT_YELLOW_MS};
use crate::simulation_engine::errors::{CrossroadError, Result};

/// How the crossroad decides whether a candidate trajectory is blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictCheck {
    /// Compare against every trajectory currently in flight.
    #[default]
    Trajectory,
    /// Compare against every pair of occupied directions. Stricter: blocks
    /// some trajectories that would not actually collide.
    DirectionPairs,
}

impl std::str::FromStr for ConflictCheck {
    type Err = CrossroadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trajectory" => Ok(ConflictCheck::Trajectory),
            "direction-pairs" => Ok(ConflictCheck::DirectionPairs),
            other => Err(CrossroadError::Parse(format!("unknown conflict check '{}'", other))),
        }
    }
}

/// Timing and policy for one crossroad run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossroadConfig {
    /// Green phase length; the signal cycle period is green + yellow
    #[serde(rename = "green-ms")]
    pub green_ms: u64,

    /// Yellow phase length
    #[serde(rename = "yellow-ms")]
    pub yellow_ms: u64,

    /// How long a car occupies the crossroad once granted
    #[serde(rename = "dwell-ms")]
    pub dwell_ms: u64,

    #[serde(rename = "conflict-check")]
    pub conflict_check: ConflictCheck,
}

impl Default for CrossroadConfig {
    fn default() -> Self {
        Self {
            green_ms: DEFAULT_GREEN_MS,
            yellow_ms: DEFAULT_YELLOW_MS,
            dwell_ms: DEFAULT_DWELL_MS,
            conflict_check: ConflictCheck::default(),
        }
    }
}

impl CrossroadConfig {
    pub fn green(&self) -> Duration {
        Duration::from_millis(self.green_ms)
    }

    pub fn yellow(&self) -> Duration {
        Duration::from_millis(self.yellow_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    /// Check the timing before starting a signal with it.
    pub fn validate(&self) -> Result<()> {
        if self.green_ms == 0 {
            return Err(CrossroadError::InvalidConfig("green-ms must be positive".to_string()));
        }
        if self.yellow_ms == 0 {
            return Err(CrossroadError::InvalidConfig("yellow-ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        config.validate()?;
        Ok(config)
    }
}
