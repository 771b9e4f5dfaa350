use crate::error::{BResult, BarometerError};
use crate::sensor::{SamplingRate, SensorAccuracy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How long `Starting` may last before the start is declared failed
pub const DEFAULT_START_TIMEOUT_MS: u64 = 2000;

/// Listener tuning. Every field has a default, so a partial JSON file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,

    /// Samples reported below this accuracy are not recorded or delivered
    #[serde(default = "default_min_accuracy")]
    pub min_accuracy: SensorAccuracy,

    #[serde(default)]
    pub sampling_rate: SamplingRate,
}

fn default_start_timeout_ms() -> u64 {
    DEFAULT_START_TIMEOUT_MS
}

fn default_min_accuracy() -> SensorAccuracy {
    SensorAccuracy::Medium
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            min_accuracy: SensorAccuracy::Medium,
            sampling_rate: SamplingRate::Ui,
        }
    }
}

impl ListenerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn from_json(json: &str) -> BResult<Self> {
        let config: ListenerConfig = serde_json::from_str(json)
            .map_err(|e| BarometerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> BResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded listener config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> BResult<()> {
        if self.start_timeout_ms == 0 {
            return Err(BarometerError::InvalidConfig(
                "start_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListenerConfig::default();
        assert_eq!(config.start_timeout(), Duration::from_millis(2000));
        assert_eq!(config.min_accuracy, SensorAccuracy::Medium);
        assert_eq!(config.sampling_rate, SamplingRate::Ui);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ListenerConfig::from_json(r#"{"min_accuracy": "High"}"#).unwrap();
        assert_eq!(config.min_accuracy, SensorAccuracy::High);
        assert_eq!(config.start_timeout_ms, DEFAULT_START_TIMEOUT_MS);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ListenerConfig::from_json(r#"{"start_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, BarometerError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ListenerConfig::load("/nonexistent/barometer.json").unwrap_err();
        assert!(matches!(err, BarometerError::Io(_)));
    }
}
