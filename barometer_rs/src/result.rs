//! Results delivered back to the caller
//!
//! A caller hands the listener a [`CallbackHandle`] with every `start`. The
//! listener delivers zero or more [`PluginResult`]s on it; it never closes
//! the channel, that is left to the layer that created it.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Failure code shared by both start failure causes
pub const ERROR_FAILED_TO_START: i32 = 3;

pub const MSG_NO_SENSOR: &str = "No sensors found to register barometer listening to.";
pub const MSG_START_TIMEOUT: &str = "Barometer could not be started.";

/// Accepted pressure reading, wire payload `{"val": .., "timestamp": ..}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureReading {
    pub val: f32,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PressureReading {
    pub fn new(val: f32, timestamp: i64) -> Self {
        Self { val, timestamp }
    }
}

/// Failure payload, wire form `{"code": .., "message": ..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
}

impl ErrorPayload {
    pub fn failed_to_start(message: &str) -> Self {
        Self {
            code: ERROR_FAILED_TO_START,
            message: message.to_string(),
        }
    }
}

/// One delivery on a result channel. Every delivery keeps the channel open.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginResult {
    /// Request accepted, results may follow
    NoResult,
    Ok(PressureReading),
    Error(ErrorPayload),
}

impl PluginResult {
    /// Status ordinal as understood by the Cordova bridge
    pub fn status_code(&self) -> i32 {
        match self {
            PluginResult::NoResult => 0,
            PluginResult::Ok(_) => 1,
            PluginResult::Error(_) => 9,
        }
    }

    pub fn keep_callback(&self) -> bool {
        true
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, PluginResult::Error(_))
    }

    /// Serialize as `{"status": .., "keepCallback": .., "message": ..}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let message = match self {
            PluginResult::NoResult => serde_json::Value::String(String::new()),
            PluginResult::Ok(reading) => serde_json::to_value(reading)?,
            PluginResult::Error(payload) => serde_json::to_value(payload)?,
        };
        serde_json::to_string(&json!({
            "status": self.status_code(),
            "keepCallback": self.keep_callback(),
            "message": message,
        }))
    }
}

/// Delivery path back to whoever issued a request.
///
/// `deliver` is invoked while the listener's lock is held. Implementations
/// must hand the result off (queue, send, upcall) and must not call back
/// into the listener from inside `deliver`.
pub trait ResultChannel: Send + Sync {
    fn deliver(&self, result: PluginResult);
}

impl ResultChannel for crossbeam::channel::Sender<PluginResult> {
    fn deliver(&self, result: PluginResult) {
        if self.send(result).is_err() {
            log::debug!("Result receiver dropped, delivery discarded");
        }
    }
}

impl ResultChannel for tokio::sync::mpsc::UnboundedSender<PluginResult> {
    fn deliver(&self, result: PluginResult) {
        if self.send(result).is_err() {
            log::debug!("Result receiver dropped, delivery discarded");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity plus channel of one outstanding request
#[derive(Clone)]
pub struct CallbackHandle {
    id: CallbackId,
    channel: Arc<dyn ResultChannel>,
}

impl CallbackHandle {
    pub fn new(channel: Arc<dyn ResultChannel>) -> Self {
        let id = CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed));
        Self { id, channel }
    }

    /// Handle with an id chosen by the host (e.g. a bridge callback id)
    pub fn with_id(id: CallbackId, channel: Arc<dyn ResultChannel>) -> Self {
        Self { id, channel }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn deliver(&self, result: PluginResult) {
        self.channel.deliver(result);
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Convenience for tests and simple hosts: a handle backed by a crossbeam channel
pub fn crossbeam_callback() -> (CallbackHandle, crossbeam::channel::Receiver<PluginResult>) {
    let (tx, rx) = crossbeam::channel::unbounded();
    (CallbackHandle::new(Arc::new(tx)), rx)
}
