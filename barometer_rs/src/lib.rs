// Barometer listener core
// Start/stop state machine for a single pressure sensor, with a start
// timeout and a single pending result channel

pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod plugin;
pub mod result;
pub mod sensor;
pub mod simulated;
pub mod timer;

pub use client::{BarometerClient, WatchId};
pub use config::ListenerConfig;
pub use error::{BResult, BarometerError};
pub use listener::{BarometerListener, ListenerSnapshot, Status};
pub use plugin::{Action, BarometerPlugin};
pub use result::{
    CallbackHandle, CallbackId, ErrorPayload, PluginResult, PressureReading, ResultChannel,
    ERROR_FAILED_TO_START,
};
pub use sensor::{
    SamplingRate, SensorAccuracy, SensorDirectory, SensorHandle, SensorManager, SensorSample,
    SensorSubscription, SensorType,
};
pub use timer::{ManualTimer, TimerHandle, TimerService, TokioTimer};
