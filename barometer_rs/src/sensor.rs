//! Sensor-side collaborator types
//!
//! The listener never talks to hardware directly. A platform layer (the
//! Android `SensorManager` behind JNI, or the simulated manager) implements
//! [`SensorDirectory`] and [`SensorSubscription`] and feeds samples back into
//! the listener as [`SensorSample`]s.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Android `Sensor.TYPE_PRESSURE`
pub const TYPE_PRESSURE: i32 = 6;

/// Kind of sensor an event or query refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    Pressure,
    Other(i32),
}

impl SensorType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            TYPE_PRESSURE => SensorType::Pressure,
            other => SensorType::Other(other),
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            SensorType::Pressure => TYPE_PRESSURE,
            SensorType::Other(raw) => *raw,
        }
    }
}

/// Platform-reported confidence of a reading, ordered from worst to best
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SensorAccuracy {
    NoContact,
    #[default]
    Unreliable,
    Low,
    Medium,
    High,
}

impl SensorAccuracy {
    /// Map an Android `SENSOR_STATUS_*` value. Unknown values are treated as unreliable.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => SensorAccuracy::NoContact,
            1 => SensorAccuracy::Low,
            2 => SensorAccuracy::Medium,
            3 => SensorAccuracy::High,
            _ => SensorAccuracy::Unreliable,
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            SensorAccuracy::NoContact => -1,
            SensorAccuracy::Unreliable => 0,
            SensorAccuracy::Low => 1,
            SensorAccuracy::Medium => 2,
            SensorAccuracy::High => 3,
        }
    }
}

impl FromStr for SensorAccuracy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no-contact" | "no_contact" => Ok(SensorAccuracy::NoContact),
            "unreliable" => Ok(SensorAccuracy::Unreliable),
            "low" => Ok(SensorAccuracy::Low),
            "medium" => Ok(SensorAccuracy::Medium),
            "high" => Ok(SensorAccuracy::High),
            other => Err(format!("unknown accuracy level '{}'", other)),
        }
    }
}

impl fmt::Display for SensorAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorAccuracy::NoContact => "no-contact",
            SensorAccuracy::Unreliable => "unreliable",
            SensorAccuracy::Low => "low",
            SensorAccuracy::Medium => "medium",
            SensorAccuracy::High => "high",
        };
        f.write_str(name)
    }
}

/// Requested delivery rate, mirroring Android's `SENSOR_DELAY_*` constants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingRate {
    Fastest,
    Game,
    #[default]
    Ui,
    Normal,
}

impl SamplingRate {
    pub fn raw(&self) -> i32 {
        match self {
            SamplingRate::Fastest => 0,
            SamplingRate::Game => 1,
            SamplingRate::Ui => 2,
            SamplingRate::Normal => 3,
        }
    }
}

/// A sensor as enumerated by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorHandle {
    pub name: String,
    pub vendor: String,
    pub sensor_type: SensorType,
}

impl SensorHandle {
    pub fn new(name: &str, vendor: &str, sensor_type: SensorType) -> Self {
        Self {
            name: name.to_string(),
            vendor: vendor.to_string(),
            sensor_type,
        }
    }
}

/// Raw sample from a subscribed sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSample {
    pub sensor_type: SensorType,
    pub values: Vec<f32>,
    /// Capture time in milliseconds since the Unix epoch
    pub capture_time_ms: i64,
}

impl SensorSample {
    pub fn new(sensor_type: SensorType, values: Vec<f32>, capture_time_ms: i64) -> Self {
        Self {
            sensor_type,
            values,
            capture_time_ms,
        }
    }

    /// Single-value pressure sample in hPa
    pub fn pressure(value: f32, capture_time_ms: i64) -> Self {
        Self::new(SensorType::Pressure, vec![value], capture_time_ms)
    }
}

/// Lets the listener discover which sensors exist
pub trait SensorDirectory: Send {
    fn list_sensors(&self, kind: SensorType) -> Vec<SensorHandle>;
}

/// Registration side of the platform sensor API.
///
/// Both calls are non-blocking registrations. Once subscribed, the platform
/// delivers samples and accuracy changes to the listener asynchronously.
pub trait SensorSubscription: Send {
    fn subscribe(&mut self, sensor: &SensorHandle, rate: SamplingRate);

    fn unsubscribe(&mut self);
}

/// Everything the listener needs from the platform
pub trait SensorManager: SensorDirectory + SensorSubscription {}

impl<T: SensorDirectory + SensorSubscription> SensorManager for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_ordering() {
        assert!(SensorAccuracy::High > SensorAccuracy::Medium);
        assert!(SensorAccuracy::Medium > SensorAccuracy::Low);
        assert!(SensorAccuracy::Low > SensorAccuracy::Unreliable);
        assert!(SensorAccuracy::Unreliable > SensorAccuracy::NoContact);
    }

    #[test]
    fn test_accuracy_from_raw() {
        assert_eq!(SensorAccuracy::from_raw(2), SensorAccuracy::Medium);
        assert_eq!(SensorAccuracy::from_raw(-1), SensorAccuracy::NoContact);
        assert_eq!(SensorAccuracy::from_raw(42), SensorAccuracy::Unreliable);
    }

    #[test]
    fn test_accuracy_parse() {
        assert_eq!("HIGH".parse::<SensorAccuracy>().unwrap(), SensorAccuracy::High);
        assert!("precise".parse::<SensorAccuracy>().is_err());
    }

    #[test]
    fn test_defaults_match_android() {
        assert_eq!(SensorAccuracy::default(), SensorAccuracy::Unreliable);
        assert_eq!(SensorAccuracy::default().raw(), 0);
        assert_eq!(SamplingRate::default(), SamplingRate::Ui);
        assert_eq!(SamplingRate::default().raw(), 2);
    }

    #[test]
    fn test_sensor_type_raw() {
        assert_eq!(SensorType::from_raw(6), SensorType::Pressure);
        assert_eq!(SensorType::from_raw(1), SensorType::Other(1));
        assert_eq!(SensorType::Other(4).raw(), 4);
    }
}
