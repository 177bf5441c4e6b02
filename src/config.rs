use crate::error::ConfigError;
use crate::global_variables::{
    DEFAULT_PEDESTRIAN_SIGNALS, DEFAULT_TICK_INTERVAL_MS, DEFAULT_TIME_UNIT_MS,
    DEFAULT_VEHICLE_SIGNALS,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for an intersection simulation.
///
/// Every field has a default, so a config file only needs the values it
/// overrides, e.g. `{ "time_unit_ms": 100 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Interval between demand-injection ticks.
    pub tick_interval_ms: u64,
    /// Wall-clock length of one time-unit used by green durations.
    pub time_unit_ms: u64,
    pub vehicle_signals: usize,
    pub pedestrian_signals: usize,
    /// When set, every signal event is appended to this CSV file.
    pub event_log: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            time_unit_ms: DEFAULT_TIME_UNIT_MS,
            vehicle_signals: DEFAULT_VEHICLE_SIGNALS,
            pedestrian_signals: DEFAULT_PEDESTRIAN_SIGNALS,
            event_log: None,
        }
    }
}

impl SimulationConfig {
    /// Reads a JSON config file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "tick_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.time_unit_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "time_unit_ms must be greater than zero".to_string(),
            });
        }
        if self.vehicle_signals + self.pedestrian_signals == 0 {
            return Err(ConfigError::Invalid {
                message: "at least one signal is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms)
    }
}
