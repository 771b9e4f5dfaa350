//! Command surface exposed to the host bridge

use crate::error::{BResult, BarometerError};
use crate::listener::BarometerListener;
use crate::result::{CallbackHandle, PluginResult};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

impl FromStr for Action {
    type Err = BarometerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            other => Err(BarometerError::UnsupportedAction(other.to_string())),
        }
    }
}

/// Bridge-facing wrapper around the listener.
///
/// Mirrors the host plugin contract: `execute` answers whether the action
/// exists, and every accepted command is acknowledged with a keep-callback
/// `NoResult` on its own channel.
#[derive(Clone)]
pub struct BarometerPlugin {
    listener: BarometerListener,
}

impl BarometerPlugin {
    pub fn new(listener: BarometerListener) -> Self {
        Self { listener }
    }

    pub fn listener(&self) -> &BarometerListener {
        &self.listener
    }

    /// Run `action`. Returns `Ok(false)` for an unsupported action, in
    /// which case nothing is delivered on `callback`.
    pub fn execute(&self, action: &str, callback: CallbackHandle) -> BResult<bool> {
        let action = match action.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                log::warn!("{}", e);
                return Ok(false);
            }
        };

        match action {
            Action::Start => {
                self.listener.start(callback)?;
            }
            Action::Stop => {
                self.listener.stop()?;
                callback.deliver(PluginResult::NoResult);
            }
        }
        Ok(true)
    }

    /// Hosting view navigated away
    pub fn on_reset(&self) -> BResult<()> {
        self.listener.on_host_reset()
    }

    pub fn on_destroy(&self) -> BResult<()> {
        self.listener.on_destroy()
    }
}
